//! エラーログファイルへの記録と機密値のマスク

use std::env;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use log::warn;

/// エラーログの出力先を指定する環境変数
pub const ERROR_LOG_ENV: &str = "ROUTEBRIDGE_ERROR_LOG";

const DEFAULT_ERROR_LOG: &str = "routebridge_error.log";
const REDACTED: &str = "***redacted***";
const MAX_LOGGED_VALUE_LEN: usize = 200;
const SEPARATOR: &str = "================================================================================";

/// キー名にこれらを含む値はログに残さない
const SENSITIVE_MARKERS: [&str; 16] = [
    "authorization",
    "cookie",
    "token",
    "secret",
    "password",
    "pass",
    "api-key",
    "api_key",
    "apikey",
    "jwt",
    "auth",
    "session",
    "csrf",
    "signature",
    "private",
    "credential",
];

/// panic時に記録するCGI変数
const CONTEXT_VARS: [&str; 8] = [
    "QUERY_STRING",
    "CONTENT_TYPE",
    "CONTENT_LENGTH",
    "SERVER_PROTOCOL",
    "SERVER_NAME",
    "SERVER_PORT",
    "REMOTE_ADDR",
    "REMOTE_PORT",
];

/// panic時に記録するリクエストヘッダー
const CONTEXT_HEADERS: [&str; 8] = [
    "HTTP_HOST",
    "HTTP_USER_AGENT",
    "HTTP_ACCEPT",
    "HTTP_X_FORWARDED_FOR",
    "HTTP_X_REQUEST_ID",
    "HTTP_REFERER",
    "HTTP_AUTHORIZATION",
    "HTTP_COOKIE",
];

/// エラーログのパス（`ROUTEBRIDGE_ERROR_LOG`、未設定なら `routebridge_error.log`）
pub fn error_log_path() -> PathBuf {
    env::var(ERROR_LOG_ENV)
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ERROR_LOG))
}

/// 指定ファイルにエラーエントリを追記する
pub fn append_error_entry(path: &Path, message: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", SEPARATOR)?;
    writeln!(file, "ROUTEBRIDGE CGI ERROR")?;
    writeln!(file, "Timestamp (UTC): {}", Utc::now().format("%Y-%m-%d %H:%M:%S%.3f UTC"))?;
    writeln!(file, "Timestamp (Local): {}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f %Z"))?;
    writeln!(file, "Process ID: {}", std::process::id())?;
    writeln!(file, "{}", "-".repeat(SEPARATOR.len()))?;
    writeln!(file, "{}", message)?;
    writeln!(file, "{}", SEPARATOR)?;
    writeln!(file)
}

/// エラーログファイルへ追記する（失敗してもリクエスト処理は継続）
pub fn log_error_to_file(message: &str) {
    let path = error_log_path();
    if let Err(e) = append_error_entry(&path, message) {
        warn!("Failed to write error log {}: {}", path.display(), e);
    }
}

/// panic時のCGI環境を機密値をマスクして書き出す
pub fn gather_cgi_panic_context(method: &str, path: &str) -> String {
    let mut lines = vec![
        "CGI panic context:".to_string(),
        format!("  REQUEST_METHOD={}", method),
        format!("  PATH_INFO={}", path),
    ];

    for key in CONTEXT_VARS {
        if let Ok(value) = env::var(key) {
            lines.push(format!("  {}={}", key, redact_value_for_log(key, &value)));
        }
    }

    lines.push("  HTTP headers:".to_string());
    let headers: Vec<String> = CONTEXT_HEADERS
        .iter()
        .filter_map(|key| {
            env::var(key)
                .ok()
                .map(|value| format!("    {}={}", key, redact_value_for_log(key, &value)))
        })
        .collect();
    if headers.is_empty() {
        lines.push("    (none)".to_string());
    } else {
        lines.extend(headers);
    }

    lines.join("\n")
}

/// ログ用に値をマスク・切り詰めする
pub fn redact_value_for_log(key: &str, value: &str) -> String {
    let key = key.to_ascii_lowercase();
    if key == "query_string" {
        return redact_query_string(value);
    }
    if is_sensitive_key_like(&key) {
        return REDACTED.to_string();
    }
    match value.char_indices().nth(MAX_LOGGED_VALUE_LEN) {
        Some((idx, _)) => format!("{}...[truncated]", &value[..idx]),
        None => value.to_string(),
    }
}

/// 小文字化済みのキー名が機密値を示すか
pub fn is_sensitive_key_like(lower_key: &str) -> bool {
    SENSITIVE_MARKERS.iter().any(|marker| lower_key.contains(marker))
}

/// クエリ文字列の機密パラメータをマスクする
pub fn redact_query_string(qs: &str) -> String {
    qs.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if is_sensitive_key_like(&key.to_ascii_lowercase()) {
                format!("{}={}", key, REDACTED)
            } else {
                format!("{}={}", key, value)
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}
