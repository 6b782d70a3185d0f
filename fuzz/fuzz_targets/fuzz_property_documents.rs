// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use indi_client::protocol::commands;
use indi_client::{Property, PropertyKind, StreamParser};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(docs) = StreamParser::new().parse(data) else {
        return;
    };

    // Definitions followed by updates, as the dispatcher would apply them
    let mut defined: Vec<Property> = Vec::new();
    for doc in &docs {
        let Some((verb, kind)) = PropertyKind::from_vector_tag(doc.tag()) else {
            continue;
        };
        match verb {
            "def" => {
                if let Ok(p) = Property::from_definition(doc, kind) {
                    // Whatever we accepted must render to a command we can parse back
                    if kind != PropertyKind::Light {
                        let command = commands::new_vector(&p).to_string();
                        let echoed = StreamParser::new().parse(command.as_bytes());
                        assert!(matches!(echoed, Ok(ref d) if d.len() == 1), "{}", command);
                    }
                    defined.push(p);
                }
            }
            "set" => {
                let name = doc.attribute("name").unwrap_or_default();
                if let Some(p) = defined.iter_mut().find(|p| p.name == name && p.kind == kind) {
                    let _ = p.apply_update(doc);
                }
            }
            _ => {}
        }
    }
});
