//! Structured JSON-lines logging.
//!
//! Every record carries a run id and a monotonic sequence number so that a
//! request, its silent token refresh and the retried request can be lined up
//! afterwards. Records go to stderr; when `LOG_DIR` is set they are also
//! written under `LOG_DIR/<run_id>/` (`events.jsonl` for info and above,
//! `trace.jsonl` for trace/debug).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains (categories for filtering)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Api,      // Backend requests and responses
    Auth,     // Session, token refresh, signals
    Document, // Assembly steps and host syncs
    System,   // Startup, configuration
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Api => "api",
            Domain::Auth => "auth",
            Domain::Document => "document",
            Domain::System => "system",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // LOG_DOMAINS: comma-separated list or "all"
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static REQUEST_SEQ: AtomicU64 = AtomicU64::new(1);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

/// Id shared by every record of one client call, replay included.
pub fn next_request_id() -> String {
    format!("q-{}", REQUEST_SEQ.fetch_add(1, Ordering::SeqCst))
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    events: Option<Mutex<BufWriter<File>>>,
    trace: Option<Mutex<BufWriter<File>>>,
}

fn open_log(path: PathBuf) -> Option<Mutex<BufWriter<File>>> {
    match File::create(&path) {
        Ok(f) => Some(Mutex::new(BufWriter::new(f))),
        Err(err) => {
            eprintln!("[log] failed to create {}: {}", path.display(), err);
            None
        }
    }
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let Ok(base) = std::env::var("LOG_DIR") else {
            return RunContext {
                run_id,
                events: None,
                trace: None,
            };
        };

        let mut run_dir = PathBuf::from(base);
        run_dir.push(&run_id);
        if let Err(err) = create_dir_all(&run_dir) {
            eprintln!("[log] failed to create run dir: {}", err);
        }
        let _ = std::fs::write(
            run_dir.join("manifest.json"),
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
                "log_dir": run_dir.to_string_lossy(),
            })
            .to_string(),
        );

        RunContext {
            events: open_log(run_dir.join("events.jsonl")),
            trace: open_log(run_dir.join("trace.jsonl")),
            run_id,
        }
    })
}

fn sanitize_fields(mut fields: Map<String, Value>) -> Map<String, Value> {
    let redacted = Value::String("[REDACTED]".to_string());
    for key in [
        "authorization",
        "Authorization",
        "token",
        "access_token",
        "refresh_token",
    ] {
        if fields.contains_key(key) {
            fields.insert(key.to_string(), redacted.clone());
        }
    }
    fields
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["request_id", "compound_code", "task_id", "step", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Option<Mutex<BufWriter<File>>>, line: &str) {
    if let Some(writer) = writer {
        if let Ok(mut w) = writer.lock() {
            let _ = writeln!(w, "{}", line);
            let _ = w.flush();
        }
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let min_level = Level::from_env();
    if level < min_level || !domain.is_enabled() {
        return;
    }

    emit_record(level, domain.as_str(), event, fields);
}

fn build_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) -> Value {
    let ctx = ensure_run_context();
    let fields = sanitize_fields(fields);
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ctx.run_id.clone()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));
    Value::Object(entry)
}

fn emit_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) {
    let line = build_record(level, component, event, fields).to_string();
    let ctx = ensure_run_context();
    match level {
        Level::Trace | Level::Debug => write_line(&ctx.trace, &line),
        _ => write_line(&ctx.events, &line),
    }
    eprintln!("{}", line);
}

// =============================================================================
// Backend client logs
// =============================================================================

pub fn log_request(request_id: &str, method: &str, url: &str, has_token: bool) {
    log(
        Level::Debug,
        Domain::Api,
        "request",
        obj(&[
            ("request_id", v_str(request_id)),
            ("method", v_str(method)),
            ("url", v_str(url)),
            ("has_token", Value::Bool(has_token)),
        ]),
    );
}

pub fn log_response(request_id: &str, method: &str, url: &str, status: u16, elapsed_ms: u64) {
    let level = if status >= 400 { Level::Warn } else { Level::Debug };
    log(
        level,
        Domain::Api,
        "response",
        obj(&[
            ("request_id", v_str(request_id)),
            ("method", v_str(method)),
            ("url", v_str(url)),
            ("status", json!(status)),
            ("elapsed_ms", json!(elapsed_ms)),
        ]),
    );
}

/// A request is being replayed after a silent token refresh.
pub fn log_retry(request_id: &str, method: &str, url: &str, reason: &str) {
    log(
        Level::Info,
        Domain::Api,
        "retry",
        obj(&[
            ("request_id", v_str(request_id)),
            ("method", v_str(method)),
            ("url", v_str(url)),
            ("reason", v_str(reason)),
        ]),
    );
}

// =============================================================================
// Auth logs
// =============================================================================

pub fn log_token_refresh(trigger: &str, outcome: &str) {
    let level = if outcome == "ok" { Level::Info } else { Level::Warn };
    log(
        level,
        Domain::Auth,
        "token_refresh",
        obj(&[("trigger", v_str(trigger)), ("outcome", v_str(outcome))]),
    );
}

pub fn log_signal(signal: &str, detail: &str) {
    log(
        Level::Warn,
        Domain::Auth,
        "signal",
        obj(&[("signal", v_str(signal)), ("msg", v_str(detail))]),
    );
}

// =============================================================================
// Document logs
// =============================================================================

pub fn log_step(step: &str, outcome: &str, detail: Option<&str>, elapsed_ms: u64) {
    let level = match outcome {
        "ok" => Level::Info,
        "skipped" => Level::Warn,
        _ => Level::Error,
    };
    log(
        level,
        Domain::Document,
        "assembly_step",
        obj(&[
            ("step", v_str(step)),
            ("outcome", v_str(outcome)),
            ("msg", detail.map(v_str).unwrap_or(Value::Null)),
            ("elapsed_ms", json!(elapsed_ms)),
        ]),
    );
}

// =============================================================================
// Utility Functions
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Fatal);
    }

    #[test]
    fn test_obj_helper() {
        let m = obj(&[("key", v_str("value")), ("num", v_num(42.0))]);
        assert_eq!(m.get("key").unwrap(), "value");
        assert_eq!(m.get("num").unwrap(), 42.0);
    }

    #[test]
    fn test_seq_increments() {
        let s1 = next_seq();
        let s2 = next_seq();
        assert!(s2 > s1);
    }

    #[test]
    fn test_tokens_are_redacted() {
        let record = build_record(
            Level::Info,
            "auth",
            "login",
            obj(&[
                ("access_token", v_str("eyJ.secret.sig")),
                ("Authorization", v_str("Bearer eyJ")),
                ("user", v_str("alice")),
            ]),
        );
        let data = &record["data"];
        assert_eq!(data["access_token"], "[REDACTED]");
        assert_eq!(data["Authorization"], "[REDACTED]");
        assert_eq!(data["user"], "alice");
    }

    #[test]
    fn test_correlation_fields_are_lifted() {
        let record = build_record(
            Level::Info,
            "document",
            "assembly_step",
            obj(&[("step", v_str("header")), ("msg", v_str("done")), ("n", v_num(1.0))]),
        );
        assert_eq!(record["step"], "header");
        assert_eq!(record["msg"], "done");
        assert!(record["data"].get("step").is_none());
        assert_eq!(record["lvl"], "INFO");
    }

    #[test]
    fn test_request_ids_are_distinct_and_lifted() {
        let first = next_request_id();
        let second = next_request_id();
        assert_ne!(first, second);

        let record = build_record(
            Level::Debug,
            "api",
            "request",
            obj(&[("request_id", v_str(&first)), ("method", v_str("GET"))]),
        );
        assert_eq!(record["request_id"], first.as_str());
        assert!(record["data"].get("request_id").is_none());
    }
}
