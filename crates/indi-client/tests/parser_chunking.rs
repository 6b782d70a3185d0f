// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::cast_possible_truncation)] // Test parameters

//! The parser yields the same documents however the stream is chunked.

use indi_client::{StreamParser, XmlElement};

const STREAM: &str = concat!(
    "<?xml version='1.0'?>\n",
    "<defNumberVector device=\"Foc\" name=\"ABS\" label=\"Absolute &amp; raw\" state=\"Idle\" perm=\"rw\">\n",
    "  <defNumber name=\"POS\" format=\"%6.0f\" min=\"0\" max=\"60000\" step=\"10\">0</defNumber>\n",
    "</defNumberVector>\n",
    "<!-- server comment with <tags> inside -->\n",
    "<setNumberVector device=\"Foc\" name=\"ABS\" state=\"Busy\"><oneNumber name=\"POS\">1000</oneNumber></setNumberVector>",
    "<message device=\"Foc\" message=\"a &lt; b, quote='&quot;'\"/>",
    "<defTextVector device=\"Foc\" name=\"INFO\"><defText name=\"NOTE\"><![CDATA[</defText> is fine here]]></defText></defTextVector>\n",
    "<delProperty device=\"Foc\" name='ABS'/>",
    "<setBLOBVector device=\"CCD\" name=\"CCD1\"><oneBLOB name=\"IMG\" size=\"5\" format=\".txt\">\naGVs\nbG8=\n</oneBLOB></setBLOBVector>",
);

fn parse_in_chunks(sizes: impl Iterator<Item = usize>) -> Vec<XmlElement> {
    let bytes = STREAM.as_bytes();
    let mut parser = StreamParser::new();
    let mut docs = Vec::new();
    let mut pos = 0;
    for size in sizes {
        if pos >= bytes.len() {
            break;
        }
        let end = (pos + size.max(1)).min(bytes.len());
        docs.extend(parser.parse(&bytes[pos..end]).unwrap());
        pos = end;
    }
    assert_eq!(pos, bytes.len(), "stream not fully fed");
    assert_eq!(parser.pending_bytes(), 0);
    docs
}

fn whole() -> Vec<XmlElement> {
    StreamParser::new().parse(STREAM.as_bytes()).unwrap()
}

#[test]
fn test_whole_stream() {
    let docs = whole();
    let tags: Vec<&str> = docs.iter().map(XmlElement::tag).collect();
    assert_eq!(
        tags,
        vec![
            "defNumberVector",
            "setNumberVector",
            "message",
            "defTextVector",
            "delProperty",
            "setBLOBVector"
        ]
    );
    assert_eq!(docs[0].attribute("label"), Some("Absolute & raw"));
    assert_eq!(docs[2].attribute("message"), Some("a < b, quote='\"'"));
    assert_eq!(docs[3].children()[0].text(), "</defText> is fine here");
}

#[test]
fn test_byte_at_a_time() {
    assert_eq!(parse_in_chunks(std::iter::repeat(1)), whole());
}

#[test]
fn test_random_chunking() {
    let expected = whole();
    for seed in 0..200u64 {
        let mut rng = fastrand::Rng::with_seed(seed);
        let max = rng.usize(1..64);
        let docs = parse_in_chunks(std::iter::repeat_with(move || rng.usize(1..=max)));
        assert_eq!(docs, expected, "seed {}", seed);
    }
}

#[test]
fn test_every_split_point() {
    let expected = whole();
    let bytes = STREAM.as_bytes();
    for split in 1..bytes.len() {
        let mut parser = StreamParser::new();
        let mut docs = parser.parse(&bytes[..split]).unwrap();
        docs.extend(parser.parse(&bytes[split..]).unwrap());
        assert_eq!(docs, expected, "split at {}", split);
    }
}

#[test]
fn test_error_is_sticky() {
    let mut parser = StreamParser::new();
    let err = parser.parse(b"<a><b></a>").unwrap_err();
    assert!(err.to_string().contains("byte"));
    assert!(parser.is_failed());
    assert!(parser.parse(b"<c/>").is_err());

    parser.reset();
    assert_eq!(parser.parse(b"<c/>").unwrap().len(), 1);
}
