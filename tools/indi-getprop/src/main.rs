// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! indi-getprop - Print INDI device properties from a running server
//!
//! ```text
//! indi-getprop                      # every element of every device
//! indi-getprop 'CCD Simulator.*.*'  # one device
//! indi-getprop -m '*.EQUATORIAL_EOD_COORD.*'
//! ```

use clap::Parser;
use colored::*;
use indi_client::{BlobData, Client, ClientConfig, ClientListener, Element, ElementValue, Property};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Print INDI device properties
#[derive(Parser, Debug)]
#[command(name = "indi-getprop")]
#[command(version = "0.1.0")]
#[command(about = "Print INDI properties as device.property.element=value")]
struct Args {
    /// Properties to print, as device.property.element ('*' matches anything)
    #[arg(default_value = "*.*.*")]
    specs: Vec<String>,

    /// Server host
    #[arg(short = 'H', long, default_value = "localhost")]
    host: String,

    /// Server port
    #[arg(short, long, default_value = "7624")]
    port: u16,

    /// Connect over a UNIX socket instead of TCP
    #[arg(short, long, conflicts_with_all = ["host", "port"])]
    unix: Option<String>,

    /// Seconds to wait for definitions
    #[arg(short, long, default_value = "2")]
    timeout: u64,

    /// Keep printing updates until Ctrl+C
    #[arg(short, long)]
    monitor: bool,

    /// Print values only
    #[arg(short = '1')]
    values_only: bool,

    /// Log every document exchanged with the server
    #[arg(short, long)]
    verbose: bool,
}

/// One `device.property.element` pattern.
#[derive(Debug, Clone)]
struct Spec {
    device: String,
    property: String,
    element: String,
}

impl Spec {
    fn parse(s: &str) -> Self {
        let mut parts = s.splitn(3, '.');
        let mut next = || parts.next().filter(|p| !p.is_empty()).unwrap_or("*").to_string();
        Self {
            device: next(),
            property: next(),
            element: next(),
        }
    }

    fn matches_property(&self, p: &Property) -> bool {
        glob_match(&self.device, &p.device) && glob_match(&self.property, &p.name)
    }
}

/// `*` matches any run of characters; everything else is literal.
fn glob_match(pattern: &str, text: &str) -> bool {
    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or("");
    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };
    let pieces: Vec<&str> = parts.collect();
    let Some((last, middle)) = pieces.split_last() else {
        return rest.is_empty();
    };
    for piece in middle {
        match rest.find(piece) {
            Some(at) => rest = &rest[at + piece.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}

fn format_value(e: &Element) -> String {
    match &e.value {
        ElementValue::Blob(b) => match &b.data {
            BlobData::Empty => String::new(),
            BlobData::Inline(bytes) => format!("<{} bytes {}>", bytes.len(), b.format),
            BlobData::Attached { id, .. } => {
                format!("<{} bytes {} attachment {}>", b.size, b.format, id.as_u64())
            }
        },
        _ => e.value_str().unwrap_or_default().to_string(),
    }
}

/// Prints matching elements; counts how many lines were written.
struct Printer {
    specs: Vec<Spec>,
    values_only: bool,
    live: AtomicBool,
    printed: AtomicUsize,
}

impl Printer {
    fn print(&self, p: &Property) {
        for spec in self.specs.iter().filter(|s| s.matches_property(p)) {
            for e in p.elements.iter().filter(|e| glob_match(&spec.element, &e.name)) {
                let value = format_value(e);
                if self.values_only {
                    println!("{}", value);
                } else {
                    println!(
                        "{}.{}.{}={}",
                        p.device.cyan(),
                        p.name.bold(),
                        e.name,
                        value.green()
                    );
                }
                self.printed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

impl ClientListener for Printer {
    fn on_new_property(&self, p: &Property) {
        if self.live.load(Ordering::SeqCst) {
            self.print(p);
        }
    }

    fn on_update_property(&self, p: &Property) {
        if self.live.load(Ordering::SeqCst) {
            self.print(p);
        }
    }

    fn on_message(&self, device: Option<&str>, message: &str) {
        log::info!("{}: {}", device.unwrap_or("server"), message);
    }

    fn on_server_disconnected(&self, exit_code: i32) {
        if exit_code != 0 {
            log::warn!("server connection lost (exit code {})", exit_code);
        }
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let specs: Vec<Spec> = args.specs.iter().map(|s| Spec::parse(s)).collect();

    let config = match &args.unix {
        Some(path) => ClientConfig::new().with_unix_socket(path),
        None => ClientConfig::new().with_tcp(&args.host, args.port),
    }
    .with_connect_timeout(Duration::from_secs(args.timeout.max(1)))
    .with_verbose(args.verbose);

    let printer = Arc::new(Printer {
        specs: specs.clone(),
        values_only: args.values_only,
        live: AtomicBool::new(false),
        printed: AtomicUsize::new(0),
    });
    let client = Client::new(config)?.with_listener(printer.clone());

    // Narrow the interest query when every spec names a concrete device.
    if specs.iter().all(|s| !s.device.contains('*')) {
        for spec in &specs {
            if spec.property.contains('*') {
                client.watch_device(&spec.device);
            } else {
                client.watch_property(&spec.device, &spec.property);
            }
        }
    }

    client.connect()?;
    client.wait_disconnected(Duration::from_secs(args.timeout));

    for device in client.devices() {
        for p in device.properties() {
            printer.print(p);
        }
    }

    if args.monitor && client.is_connected() {
        let running = Arc::new(AtomicBool::new(true));
        let r = running.clone();
        ctrlc::set_handler(move || {
            r.store(false, Ordering::SeqCst);
        })?;

        printer.live.store(true, Ordering::SeqCst);
        while running.load(Ordering::SeqCst) {
            if client.wait_disconnected(Duration::from_millis(200)) {
                break;
            }
        }
    }

    client.disconnect();

    if printer.printed.load(Ordering::SeqCst) == 0 {
        return Err(format!("no properties matched {}", args.specs.join(" ")).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*", ""));
        assert!(glob_match("*", "CCD Simulator"));
        assert!(glob_match("CCD*", "CCD Simulator"));
        assert!(glob_match("*Sim*", "CCD Simulator"));
        assert!(glob_match("CCD*tor", "CCD Simulator"));
        assert!(glob_match("CONNECTION", "CONNECTION"));
        assert!(!glob_match("CONNECTION", "CONNECTIONS"));
        assert!(!glob_match("a*a", "a"));
        assert!(!glob_match("CCD*", "Focuser"));
    }

    #[test]
    fn test_spec_parse() {
        let s = Spec::parse("Telescope Simulator.EQUATORIAL_EOD_COORD.RA");
        assert_eq!(s.device, "Telescope Simulator");
        assert_eq!(s.property, "EQUATORIAL_EOD_COORD");
        assert_eq!(s.element, "RA");

        let s = Spec::parse("Focuser");
        assert_eq!((s.property.as_str(), s.element.as_str()), ("*", "*"));
    }
}
