//! Line protocol: one JSON request per line, one JSON response per line.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use va_core::PointValue;

use crate::error::{ServerError, ServerResult};
use crate::server::SimServer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Get { name: String },
    Put { name: String, value: serde_json::Value },
    Info { name: String },
    List,
    Stats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    pub fn value(value: serde_json::Value) -> Self {
        Self {
            ok: true,
            value: Some(value),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            value: None,
            error: Some(message.into()),
        }
    }
}

/// Answer one request.
///
/// `get` and `put` never fail for a well-formed request: unknown names read
/// as a default and rejected writes are logged and acknowledged.
pub fn handle(server: &SimServer, request: Request) -> Response {
    match request {
        Request::Get { name } => Response::value(server.read(&name).to_json()),
        Request::Put { name, value } => match PointValue::from_json(value) {
            Ok(value) => {
                server.write(&name, value);
                Response::ok()
            }
            Err(e) => Response::error(e.to_string()),
        },
        Request::Info { name } => match server
            .read_structured(&name)
            .map_err(|e| e.to_string())
            .and_then(|s| serde_json::to_value(s).map_err(|e| e.to_string()))
        {
            Ok(value) => Response::value(value),
            Err(e) => Response::error(e),
        },
        Request::List => Response::value(
            server
                .list()
                .into_iter()
                .map(|field| serde_json::Value::from(field.name))
                .collect(),
        ),
        Request::Stats => {
            let stats = server.stats();
            Response::value(json!({
                "cycles": stats.cycles,
                "writes_applied": stats.writes_applied,
                "omitted": server.omitted(),
                "measurements": stats.measurements,
                "interval_s": stats.interval.as_secs_f64(),
                "last_eval_s": stats.last_eval.as_secs_f64(),
                "average_eval_s": stats.average_eval.as_secs_f64(),
            }))
        }
    }
}

/// Parse and answer one line.
pub fn handle_line(server: &SimServer, line: &str) -> Response {
    match serde_json::from_str::<Request>(line) {
        Ok(request) => handle(server, request),
        Err(e) => {
            debug!(error = %e, "malformed request");
            Response::error(format!("malformed request: {}", e))
        }
    }
}

/// Run the request loop until `reader` reaches end of input.
///
/// Blank lines are ignored.
pub fn serve_stream<R: BufRead, W: Write>(
    server: &SimServer,
    reader: R,
    mut writer: W,
) -> ServerResult<()> {
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = handle_line(server, line);
        let encoded = serde_json::to_string(&response).map_err(|e| ServerError::Protocol {
            message: e.to_string(),
        })?;
        writeln!(writer, "{}", encoded)?;
        writer.flush()?;
    }
    Ok(())
}

/// Accept connections forever, one thread per connection.
pub fn serve_listener(server: Arc<SimServer>, listener: TcpListener) -> ServerResult<()> {
    info!(addr = ?listener.local_addr().ok(), "listening");
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        let server = server.clone();
        thread::Builder::new()
            .name("va-conn".to_string())
            .spawn(move || serve_connection(&server, stream))?;
    }
    Ok(())
}

pub fn serve_tcp(server: Arc<SimServer>, addr: impl ToSocketAddrs) -> ServerResult<()> {
    serve_listener(server, TcpListener::bind(addr)?)
}

fn serve_connection(server: &SimServer, stream: TcpStream) {
    let peer = stream.peer_addr().ok();
    debug!(peer = ?peer, "connection opened");
    let result = stream
        .try_clone()
        .map_err(ServerError::from)
        .and_then(|reader| serve_stream(server, BufReader::new(reader), stream));
    match result {
        Ok(()) => debug!(peer = ?peer, "connection closed"),
        Err(e) => warn!(peer = ?peer, error = %e, "connection failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_are_tagged_by_op() {
        let request: Request =
            serde_json::from_str(r#"{"op":"put","name":"Q1","value":5.0}"#).unwrap();
        assert_eq!(
            request,
            Request::Put {
                name: "Q1".into(),
                value: json!(5.0)
            }
        );
        let request: Request = serde_json::from_str(r#"{"op":"list"}"#).unwrap();
        assert_eq!(request, Request::List);
    }

    #[test]
    fn response_omits_empty_members() {
        let json = serde_json::to_string(&Response::ok()).unwrap();
        assert_eq!(json, r#"{"ok":true}"#);
        let json = serde_json::to_string(&Response::error("bad")).unwrap();
        assert_eq!(json, r#"{"ok":false,"error":"bad"}"#);
    }
}
