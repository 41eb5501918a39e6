//! Block payload codec.
//!
//! Payload format (after gunzip):
//! ```text
//! {"h":{"head":[t0,v0],"tail":[tN,vN],...},"t":[dt0,dt1,...],"v":[dv0,dv1,...]}
//! ```
//! `t` and `v` are deltas; absolute samples are recovered by a running sum
//! seeded from `head`.

use std::{
    io::{Read, Write},
    sync::LazyLock,
};

use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{DataPoint, error::CodecError};

/// The only supported encoding tag.
pub const GZIP_EXT: &str = "gz";

static ENVELOPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\{"h":(?P<h>\{.+?\}),"t":(?P<t>\[.+?\]),"v":(?P<v>\[.+?\])\}$"#)
        .expect("envelope pattern compiles")
});

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// origin the delta streams are relative to
    pub head: (i64, f64),
    /// last absolute sample in the block
    pub tail: (i64, f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBlock {
    pub header: BlockHeader,
    pub points: Vec<DataPoint>,
}

/// Raw pieces of a matched envelope, still JSON text.
struct Envelope<'a> {
    h: &'a str,
    t: &'a str,
    v: &'a str,
}

impl<'a> Envelope<'a> {
    fn parse(text: &'a str) -> Result<Self, CodecError> {
        let caps = ENVELOPE
            .captures(text.trim_end())
            .ok_or_else(|| CodecError::corrupt("envelope does not match"))?;

        // all three groups are mandatory in the pattern
        let group = |name| caps.name(name).map(|m| m.as_str()).unwrap_or_default();
        Ok(Self {
            h: group("h"),
            t: group("t"),
            v: group("v"),
        })
    }
}

fn decompress(ext: &str, raw: &[u8]) -> Result<String, CodecError> {
    if ext != GZIP_EXT {
        return Err(CodecError::UnsupportedEncoding(ext.to_string()));
    }

    let mut text = String::new();
    GzDecoder::new(raw)
        .read_to_string(&mut text)
        .map_err(|e| CodecError::corrupt(format!("gzip `{e}`")))?;
    Ok(text)
}

/// Decodes only the header. Used for the last-datapoint fast path.
pub fn decode_header(ext: &str, raw: &[u8]) -> Result<BlockHeader, CodecError> {
    let text = decompress(ext, raw)?;
    let env = Envelope::parse(&text)?;
    Ok(serde_json::from_str(env.h)?)
}

/// Decodes a full block into absolute samples, in array order.
pub fn decode(ext: &str, raw: &[u8]) -> Result<DecodedBlock, CodecError> {
    let text = decompress(ext, raw)?;
    let env = Envelope::parse(&text)?;

    let header: BlockHeader = serde_json::from_str(env.h)?;
    let t: Vec<i64> = serde_json::from_str(env.t)?;
    let v: Vec<f64> = serde_json::from_str(env.v)?;

    let points = integrate(header.head, &t, &v)?;
    Ok(DecodedBlock { header, points })
}

/// Running sum of both delta streams, seeded from `head`.
pub fn integrate(head: (i64, f64), t: &[i64], v: &[f64]) -> Result<Vec<DataPoint>, CodecError> {
    if t.len() != v.len() {
        return Err(CodecError::corrupt(format!(
            "{} time deltas but {} value deltas",
            t.len(),
            v.len()
        )));
    }

    let (mut ts, mut val) = head;
    let mut points = Vec::with_capacity(t.len());
    for (dt, dv) in t.iter().zip(v) {
        ts = ts
            .checked_add(*dt)
            .ok_or_else(|| CodecError::corrupt("timestamp overflow"))?;
        val += dv;
        points.push(DataPoint::new(ts, val));
    }
    Ok(points)
}

/// Encodes absolute samples as a gzip envelope.
///
/// The header origin is the first sample, so the first deltas are zero.
pub fn encode(points: &[DataPoint]) -> std::io::Result<Vec<u8>> {
    let first = points.first().map(|p| (p.timestamp, p.value)).unwrap_or((0, 0.0));
    let last = points.last().map(|p| (p.timestamp, p.value)).unwrap_or(first);

    let mut t = Vec::with_capacity(points.len());
    let mut v = Vec::with_capacity(points.len());
    let mut prev = first;
    for p in points {
        t.push(p.timestamp - prev.0);
        v.push(p.value - prev.1);
        prev = (p.timestamp, p.value);
    }

    let header = BlockHeader {
        head: first,
        tail: last,
    };
    let text = format!(
        r#"{{"h":{},"t":{},"v":{}}}"#,
        serde_json::to_string(&header)?,
        serde_json::to_string(&t)?,
        serde_json::to_string(&v)?,
    );

    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(text.as_bytes())?;
    enc.finish()
}

#[cfg(test)]
mod test {
    use super::*;

    fn gzip(text: &str) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(text.as_bytes()).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_decode_deltas() {
        let raw = gzip(r#"{"h":{"head":[1000,10],"tail":[1005,13.5]},"t":[0,2,3],"v":[0,1.5,2]}"#);
        let block = decode(GZIP_EXT, &raw).unwrap();

        assert_eq!(block.header.head, (1000, 10.0));
        assert_eq!(block.header.tail, (1005, 13.5));
        assert_eq!(
            block.points,
            vec![
                DataPoint::new(1000, 10.0),
                DataPoint::new(1002, 11.5),
                DataPoint::new(1005, 13.5),
            ]
        );
    }

    #[test]
    fn test_delta_round_trip() {
        let points = vec![
            DataPoint::new(1_506_803_712, 2412.0),
            DataPoint::new(1_506_803_713, 2413.5),
            DataPoint::new(1_506_803_716, 2413.5),
            DataPoint::new(1_506_803_720, 2400.25),
        ];
        let raw = encode(&points).unwrap();
        let block = decode(GZIP_EXT, &raw).unwrap();

        assert_eq!(block.points, points);
        assert_eq!(block.header.tail, (1_506_803_720, 2400.25));
    }

    #[test]
    fn test_header_only() {
        let raw = encode(&[DataPoint::new(5, 1.0), DataPoint::new(9, 4.0)]).unwrap();
        let header = decode_header(GZIP_EXT, &raw).unwrap();
        assert_eq!(header.head, (5, 1.0));
        assert_eq!(header.tail, (9, 4.0));
    }

    #[test]
    fn test_unsupported_encoding() {
        let raw = encode(&[DataPoint::new(5, 1.0)]).unwrap();
        assert!(matches!(
            decode("json", &raw),
            Err(CodecError::UnsupportedEncoding(ext)) if ext == "json"
        ));
    }

    #[test]
    fn test_not_gzip() {
        assert!(matches!(
            decode(GZIP_EXT, b"definitely not gzip"),
            Err(CodecError::CorruptPayload(_))
        ));
    }

    #[test]
    fn test_envelope_mismatch() {
        let raw = gzip(r#"{"header":{"head":[0,0]},"t":[1],"v":[1]}"#);
        assert!(matches!(decode(GZIP_EXT, &raw), Err(CodecError::CorruptPayload(_))));

        let empty = gzip(r#"{"h":{"head":[0,0],"tail":[0,0]},"t":[],"v":[]}"#);
        assert!(matches!(decode(GZIP_EXT, &empty), Err(CodecError::CorruptPayload(_))));
    }

    #[test]
    fn test_length_mismatch() {
        let raw = gzip(r#"{"h":{"head":[0,0],"tail":[3,3]},"t":[1,2],"v":[1]}"#);
        assert!(matches!(decode(GZIP_EXT, &raw), Err(CodecError::CorruptPayload(_))));
    }
}
