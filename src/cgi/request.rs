//! CGI環境変数と標準入力からのリクエスト構築

use std::collections::HashMap;
use std::env;
use std::io::Read;

use log::{debug, warn};

use crate::common::utils::{is_header_name_valid, is_header_value_valid};
use crate::common::{get_max_body_size, parse_query_string, percent_decode, Request};
use crate::error::Error;

/// `HTTP_X_AUTH_TOKEN` → `X-Auth-Token`
fn header_name_from_env(key: &str) -> String {
    key.split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// CGI変数からHTTPヘッダーを取り出す（`HTTP_*`、`CONTENT_TYPE`、`CONTENT_LENGTH`）
pub fn get_cgi_headers<I>(vars: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut headers: Vec<(String, String)> = vars
        .into_iter()
        .filter_map(|(key, value)| {
            let name = match key.strip_prefix("HTTP_") {
                Some(rest) => header_name_from_env(rest),
                None if key == "CONTENT_TYPE" || key == "CONTENT_LENGTH" => header_name_from_env(&key),
                None => return None,
            };
            if !is_header_name_valid(&name) || !is_header_value_valid(&value) {
                warn!("Dropping CGI header {} with invalid characters", key);
                return None;
            }
            Some((name, value))
        })
        .collect();
    headers.sort();
    headers
}

/// `Cookie` ヘッダーを名前と値に分解する
pub fn parse_cookie_header(value: &str) -> HashMap<String, String> {
    value
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), percent_decode(value.trim())))
        })
        .collect()
}

/// `CONTENT_LENGTH` 分のボディを読み込む（上限超過は `PayloadTooLarge`）
pub fn read_request_body<R: Read>(content_length: Option<&str>, input: &mut R) -> Result<Vec<u8>, Error> {
    let length = match content_length.and_then(|v| v.trim().parse::<usize>().ok()) {
        Some(n) if n > 0 => n,
        _ => return Ok(Vec::new()),
    };

    let max = get_max_body_size();
    if length > max {
        return Err(Error::PayloadTooLarge(format!(
            "Request body size {} bytes exceeds maximum allowed size {} bytes",
            length, max
        )));
    }

    let mut buffer = vec![0u8; length];
    input
        .read_exact(&mut buffer)
        .map_err(|e| Error::MalformedBody(format!("Failed to read request body: {}", e)))?;
    Ok(buffer)
}

/// CGI変数とボディからリクエストを構築する
pub fn build_request(vars: &HashMap<String, String>, body: Vec<u8>) -> Result<Request, Error> {
    let method = vars.get("REQUEST_METHOD").map(String::as_str).unwrap_or("GET");
    let path = vars
        .get("PATH_INFO")
        .filter(|p| !p.is_empty())
        .map(String::as_str)
        .unwrap_or("/");

    let mut builder = Request::builder(method, path);
    if let Some(qs) = vars.get("QUERY_STRING") {
        builder = builder.query_string(qs);
    }
    for (name, value) in get_cgi_headers(vars.iter().map(|(k, v)| (k.clone(), v.clone()))) {
        builder = builder.header(&name, value);
    }
    if let Some(cookie) = vars.get("HTTP_COOKIE") {
        for (name, value) in parse_cookie_header(cookie) {
            builder = builder.cookie(name, value);
        }
    }

    let is_form = vars
        .get("CONTENT_TYPE")
        .map(|ct| ct.to_ascii_lowercase().starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);
    if is_form {
        let text = String::from_utf8_lossy(&body).into_owned();
        for (key, value) in parse_query_string(&text) {
            builder = builder.form(key, value);
        }
    }

    debug!("Built CGI request {} {} ({} body bytes)", method, path, body.len());
    builder.body(body).build()
}

/// 現在のプロセス環境のCGI変数
pub fn cgi_vars() -> HashMap<String, String> {
    env::vars().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_name_from_env() {
        assert_eq!(header_name_from_env("X_AUTH_TOKEN"), "X-Auth-Token");
        assert_eq!(header_name_from_env("CONTENT_TYPE"), "Content-Type");
        assert_eq!(header_name_from_env("HOST"), "Host");
    }

    #[test]
    fn test_parse_cookie_header() {
        let cookies = parse_cookie_header("session=abc; theme=dark%20mode; broken; =x");
        assert_eq!(cookies.get("session"), Some(&"abc".to_string()));
        assert_eq!(cookies.get("theme"), Some(&"dark mode".to_string()));
        assert_eq!(cookies.len(), 2);
    }
}
