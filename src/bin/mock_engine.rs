//! Mock engine binary for integration testing
//!
//! Accepts the same launch arguments as a real engine, announces its agent
//! port on stdout and answers line-delimited JSON requests.
//!
//! Behaviour switches (environment):
//! - `MOCK_ENGINE_LOG`: append every received request to this file
//! - `MOCK_ENGINE_MODE=exit-early`: print an error and exit before listening
//! - `MOCK_ENGINE_MODE=silent`: listen but never announce the port

use serde_json::{json, Value};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};

struct MockArgs {
    headless: bool,
    port: u16,
}

fn parse_args() -> MockArgs {
    let mut args = MockArgs {
        headless: false,
        port: 0,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--headless" => args.headless = true,
            "--agent-tcp-port" => {
                args.port = iter.next().and_then(|p| p.parse().ok()).unwrap_or(0);
            }
            _ => {}
        }
    }
    args
}

fn main() {
    let args = parse_args();
    let mode = std::env::var("MOCK_ENGINE_MODE").unwrap_or_default();

    println!("Mock Engine v1.0 (headless={})", args.headless);

    if mode == "exit-early" {
        eprintln!("ERROR: failed to load project");
        std::process::exit(1);
    }

    let listener = match TcpListener::bind(("127.0.0.1", args.port)) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("ERROR: bind failed: {}", e);
            std::process::exit(1);
        }
    };
    let port = listener.local_addr().map(|a| a.port()).unwrap_or(0);

    if mode != "silent" {
        println!("AGENT_TCP_PORT={}", port);
    }
    std::io::stdout().flush().ok();

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                if serve(stream, args.headless) {
                    break;
                }
            }
            Err(_) => continue,
        }
    }
}

/// Serve one connection; returns true when the engine should exit
fn serve(stream: TcpStream, headless: bool) -> bool {
    let mut writer = match stream.try_clone() {
        Ok(w) => w,
        Err(_) => return false,
    };
    let reader = BufReader::new(stream);

    for line in reader.lines() {
        let Ok(line) = line else { break };
        let request: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(_) => continue,
        };
        log_request(&line);

        let (response, quit) = respond(&request, headless);
        let body = serde_json::to_string(&response).unwrap_or_default();
        if writeln!(writer, "{}", body).is_err() {
            break;
        }
        writer.flush().ok();

        if quit {
            return true;
        }
    }
    false
}

fn respond(request: &Value, headless: bool) -> (Value, bool) {
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let kind = request.get("type").and_then(Value::as_str).unwrap_or("");
    let name = request.get("name").and_then(Value::as_str).unwrap_or("");

    match (kind, name) {
        ("command", "quit") => (json!({"id": id, "ok": true}), true),
        ("command", "fail") => (
            json!({"id": id, "ok": false, "error": "requested failure"}),
            false,
        ),
        ("command", "screenshot") if headless => (
            json!({"id": id, "ok": false, "error": "cannot capture in headless mode"}),
            false,
        ),
        ("command", "screenshot") => (json!({"id": id, "ok": true, "path": "user://shot.png"}), false),
        ("echo", _) => (json!({"id": id, "ok": true, "echo": request}), false),
        _ => (json!({"id": id, "ok": true}), false),
    }
}

fn log_request(line: &str) {
    let Ok(path) = std::env::var("MOCK_ENGINE_LOG") else {
        return;
    };
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        writeln!(file, "{}", line).ok();
    }
}
