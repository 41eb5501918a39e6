use std::time::Duration;

use reqwest::{
    Certificate, Client, Response,
    header::{ACCEPT, HeaderMap, HeaderValue},
};
use tracing::debug;

use super::{Catalog, error::CatalogError};
use crate::{
    block::{BlockDescriptor, BlockId},
    config::TmpoConfig,
};

const ACCEPT_JSON: &str = "application/json";
const ACCEPT_GZIP: &str = "application/gzip";
const API_VERSION: &str = "1.0";

/// Catalog served by the sensor platform's REST API.
pub struct HttpCatalog {
    client: Client,
    base: String,
}

impl HttpCatalog {
    pub async fn new(cfg: &TmpoConfig) -> Result<Self, CatalogError> {
        let mut headers = HeaderMap::new();
        headers.insert("X-Version", HeaderValue::from_static(API_VERSION));

        let mut builder = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(cfg.timeout_secs));

        if let Some(path) = &cfg.cert {
            let pem = tokio::fs::read(path)
                .await
                .map_err(|e| CatalogError::CertificateError(format!("{}: {e}", path.display())))?;
            let cert = Certificate::from_pem(&pem)
                .map_err(|e| CatalogError::CertificateError(e.to_string()))?;
            builder = builder.add_root_certificate(cert);
        }

        Ok(Self {
            client: builder.build()?,
            base: format!("{}://{}", cfg.scheme, cfg.host),
        })
    }

    fn sync_url(&self, sid: &str) -> String {
        format!("{}/sensor/{sid}/tmpo/sync", self.base)
    }

    fn block_url(&self, sid: &str, id: &BlockId) -> String {
        format!("{}/sensor/{sid}/tmpo/{}/{}/{}", self.base, id.rid, id.lvl, id.bid)
    }
}

fn check_status(res: Response) -> Result<Response, CatalogError> {
    let status = res.status();
    if status.is_success() {
        Ok(res)
    } else {
        Err(CatalogError::BadStatus {
            url: res.url().to_string(),
            status: status.as_u16(),
        })
    }
}

impl Catalog for HttpCatalog {
    async fn list_blocks(
        &self,
        sid: &str,
        token: &str,
        cursor: BlockId,
    ) -> Result<Vec<BlockDescriptor>, CatalogError> {
        let res = self
            .client
            .get(self.sync_url(sid))
            .header(ACCEPT, ACCEPT_JSON)
            .header("X-Token", token)
            .query(&[("rid", cursor.rid), ("lvl", cursor.lvl as i64), ("bid", cursor.bid)])
            .send()
            .await?;

        let mut blocks: Vec<BlockDescriptor> = check_status(res)?.json().await?;
        blocks.sort_by_key(|b| b.id.bid);
        Ok(blocks)
    }

    async fn fetch_block(
        &self,
        sid: &str,
        token: &str,
        block: &BlockDescriptor,
    ) -> Result<Vec<u8>, CatalogError> {
        let id = block.id;
        debug!(sid, rid = id.rid, lvl = id.lvl, bid = id.bid, "[r] requesting block");

        let res = self
            .client
            .get(self.block_url(sid, &id))
            .header(ACCEPT, ACCEPT_GZIP)
            .header("X-Token", token)
            .send()
            .await?;

        Ok(check_status(res)?.bytes().await?.to_vec())
    }
}
