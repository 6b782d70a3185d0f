// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use indi_client::StreamParser;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&split, stream)) = data.split_first() else {
        return;
    };

    // Whole input in one chunk
    let mut whole = StreamParser::with_max_document_size(1 << 16);
    let expected = whole.parse(stream);

    // Same input split at a fuzzer-chosen point
    let at = usize::from(split) % (stream.len() + 1);
    let mut split_parser = StreamParser::with_max_document_size(1 << 16);
    let mut docs = Vec::new();
    let mut failed = false;
    for chunk in [&stream[..at], &stream[at..]] {
        match split_parser.parse(chunk) {
            Ok(d) => docs.extend(d),
            Err(_) => {
                failed = true;
                break;
            }
        }
    }

    if let Ok(expected) = expected {
        assert!(!failed, "split parse failed where whole parse succeeded");
        assert_eq!(docs, expected);
    }
});
