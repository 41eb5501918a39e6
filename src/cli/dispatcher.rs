use jiff::Timestamp;
use serde::Serialize;

use crate::{
    block::DataPoint,
    catalog::Catalog,
    query::{SeriesQuery, frame::Frame, time::epoch_to_timestamp},
    session::Session,
    sync::SyncOutcome,
};

use super::{
    error::DispatchError,
    model::{Cli, CliCommands, WindowArgs},
};

/// Epoch, or a datetime when asked for and representable.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(untagged)]
enum Time {
    Epoch(i64),
    Datetime(Timestamp),
}

impl Time {
    fn render(epoch: i64, datetime: bool) -> Self {
        match datetime.then(|| epoch_to_timestamp(epoch)).flatten() {
            Some(ts) => Self::Datetime(ts),
            None => Self::Epoch(epoch),
        }
    }
}

#[derive(Serialize)]
struct PointResponse {
    timestamp: Time,
    value: f64,
}

impl PointResponse {
    fn new(point: DataPoint, datetime: bool) -> Self {
        Self {
            timestamp: Time::render(point.timestamp, datetime),
            value: point.value,
        }
    }
}

#[derive(Serialize)]
struct FrameResponse {
    columns: Vec<String>,
    rows: Vec<(Time, Vec<Option<f64>>)>,
}

impl FrameResponse {
    fn new(frame: Frame, datetime: bool) -> Self {
        Self {
            columns: frame.columns,
            rows: frame
                .rows
                .into_iter()
                .map(|row| (Time::render(row.timestamp, datetime), row.values))
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct SyncResponse {
    sid: String,
    #[serde(flatten)]
    outcome: SyncOutcome,
}

impl WindowArgs {
    fn query(&self) -> SeriesQuery {
        SeriesQuery {
            rid: None,
            head: self.head.clone(),
            tail: self.tail.clone(),
        }
    }
}

impl Cli {
    /// Runs the command, returning JSON for commands that print something.
    pub async fn dispatch<C: Catalog>(self, session: &Session<C>) -> Result<Option<String>, DispatchError> {
        Ok(match self.command {
            CliCommands::Add { sid, token } => {
                Some(serde_json::to_string(&session.register(&sid, &token).await?)?)
            }
            CliCommands::Remove { sid } => Some(serde_json::to_string(&session.deregister(&sid).await?)?),
            CliCommands::Reset { sid } => Some(serde_json::to_string(&session.reset(&sid).await?)?),
            CliCommands::Sensors => Some(serde_json::to_string(&session.sensors().await?)?),
            CliCommands::Sync { sids } => {
                let report = session.sync(&sids).await?;
                let total = report.results.len();
                let failed = report.failures().count();
                if failed > 0 {
                    return Err(DispatchError::SyncFailed { failed, total });
                }

                let res: Vec<SyncResponse> = report
                    .results
                    .into_iter()
                    .filter_map(|(sid, res)| res.ok().map(|outcome| SyncResponse { sid, outcome }))
                    .collect();
                Some(serde_json::to_string(&res)?)
            }
            CliCommands::List { sids } => Some(serde_json::to_string(&session.list(&sids).await?)?),
            CliCommands::Series(args) => {
                let mut query = args.window.query();
                query.rid = args.rid;
                let points = match args.window.remote {
                    true => session.remote().series(&args.sid, &query).await?,
                    false => session.series(&args.sid, &query).await?,
                };
                let res: Vec<PointResponse> = points
                    .into_iter()
                    .map(|p| PointResponse::new(p, args.window.datetime))
                    .collect();
                Some(serde_json::to_string(&res)?)
            }
            CliCommands::Frame(args) => {
                let query = args.window.query();
                let frame = match args.window.remote {
                    true => session.remote().dataframe(&args.sids, &query).await?,
                    false => session.dataframe(&args.sids, &query).await?,
                };
                Some(serde_json::to_string(&FrameResponse::new(frame, args.window.datetime))?)
            }
            CliCommands::First(args) => {
                let first = match args.remote {
                    true => session.remote().first_timestamp(&args.sid).await?,
                    false => session.first_timestamp(&args.sid).await?,
                };
                let res = first.map(|epoch| Time::render(epoch, args.datetime));
                Some(serde_json::to_string(&res)?)
            }
            CliCommands::Last(args) => {
                let last = match args.remote {
                    true => session.remote().last_datapoint(&args.sid).await?,
                    false => session.last_datapoint(&args.sid).await?,
                };
                let res = last.map(|p| PointResponse::new(p, args.datetime));
                Some(serde_json::to_string(&res)?)
            }
        })
    }
}
