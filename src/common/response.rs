//! HTTPレスポンスの実装

use std::io::Write;
use std::ops::ControlFlow;

use log::{debug, warn};
use serde::Serialize;

use crate::error::Error;
use super::encodable::ensure_encodable;
use super::http::reason_phrase;
use super::utils::{is_header_name_valid, is_header_value_valid};

/// HTTPレスポンス
///
/// ヘッダーは挿入順に送出される。キーは大文字小文字を区別し、
/// 同じキーへの書き込みは（追記を指定しない限り）後勝ち。
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    protocol_version: String,
    emitted: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self::new(200)
    }
}

impl Response {
    /// 新しいレスポンスを作成
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
            protocol_version: "1.1".to_string(),
            emitted: false,
        }
    }

    /// ステータスと本文を指定して作成
    pub fn text(status: u16, content: impl Into<Vec<u8>>) -> Self {
        Self::new(status).with_body(content)
    }

    /// 200 OKレスポンスを作成
    pub fn ok() -> Self {
        Self::new(200)
    }

    /// 404 Not Foundレスポンスを作成
    pub fn not_found() -> Self {
        Self::text(404, "404 Not Found")
    }

    /// 500 Internal Server Errorレスポンスを作成
    pub fn internal_server_error() -> Self {
        Self::text(500, "Internal Server Error")
    }

    /// ヘッダーを設定（ビルダー形式）
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value, true);
        self
    }

    /// ボディを設定（ビルダー形式）
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// JSONをボディとして設定
    ///
    /// NaN・無限大を含む値は `Error::Serialization` になる。
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, Error> {
        ensure_encodable(value)?;
        let json = serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;
        self.set_content_type("application/json", "utf-8");
        self.body = json;
        Ok(self)
    }

    /// JSONレスポンスを作成し、追加ヘッダーをマージする
    pub fn create_json<T: Serialize + ?Sized>(
        data: &T,
        status: u16,
        headers: &[(&str, &str)],
    ) -> Result<Self, Error> {
        let mut response = Self::new(status).json(data)?;
        for (name, value) in headers {
            response.set_header(*name, *value, true);
        }
        Ok(response)
    }

    /// リダイレクトレスポンスを作成（送出は呼び出し側が行う）
    pub fn redirect_to(url: impl Into<String>, status: u16) -> Self {
        Self::new(status).with_header("Location", url)
    }

    /// Error型から固定メッセージのレスポンスを生成
    pub fn from_error(error: &Error) -> Self {
        let status = error.status_code();
        let message = match status {
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            413 => "Content Too Large",
            _ => "Internal Server Error",
        };
        Self::text(status, message).with_header("Content-Type", "text/plain; charset=utf-8")
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) -> &mut Self {
        self.status = status;
        self
    }

    /// ヘッダーを設定する
    ///
    /// `replace` が偽で既に存在する場合は `, ` で連結して追記する。
    /// 制御文字を含む名前・値は拒否される。
    pub fn set_header(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        replace: bool,
    ) -> &mut Self {
        let (name, value) = (name.into(), value.into());
        if !is_header_name_valid(&name) || !is_header_value_valid(&value) {
            warn!("Rejected response header '{}' with invalid characters", name.escape_debug());
            return self;
        }

        match self.headers.iter_mut().find(|(k, _)| *k == name) {
            Some((_, existing)) if replace => *existing = value,
            Some((_, existing)) => {
                existing.push_str(", ");
                existing.push_str(&value);
            }
            None => self.headers.push((name, value)),
        }
        self
    }

    /// 既存の値と連結せず、独立したヘッダー行として追加する（`Set-Cookie` 用）
    #[cfg_attr(not(feature = "cgi"), allow(dead_code))]
    pub(crate) fn push_header_line(&mut self, name: &str, value: String) {
        if is_header_name_valid(name) && is_header_value_valid(&value) {
            self.headers.push((name.to_string(), value));
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// 送出順のヘッダー一覧
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn remove_header(&mut self, name: &str) -> &mut Self {
        self.headers.retain(|(k, _)| k != name);
        self
    }

    pub fn set_content(&mut self, content: impl Into<Vec<u8>>) -> &mut Self {
        self.body = content.into();
        self
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// `Content-Type: <mime>; charset=<charset>` を設定
    pub fn set_content_type(&mut self, mime: &str, charset: &str) -> &mut Self {
        self.set_header("Content-Type", format!("{}; charset={}", mime, charset), true)
    }

    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    pub fn set_protocol_version(&mut self, version: impl Into<String>) -> &mut Self {
        self.protocol_version = version.into();
        self
    }

    /// 既に送出済みかどうか
    pub fn is_emitted(&self) -> bool {
        self.emitted
    }

    /// ステータス行、ヘッダー、ボディを書き出す
    ///
    /// 一度だけ送出される。二度目以降は何も書かずに `Ok(false)` を返す。
    pub fn emit<W: Write>(&mut self, out: &mut W) -> Result<bool, Error> {
        let status_line = format!(
            "HTTP/{} {} {}",
            self.protocol_version,
            self.status,
            reason_phrase(self.status)
        );
        self.emit_with(out, status_line, true, false)
    }

    /// CGI形式（`Status:` 行と `Content-Length`）で書き出す
    pub fn emit_cgi<W: Write>(&mut self, out: &mut W) -> Result<bool, Error> {
        let status_line = format!("Status: {} {}", self.status, reason_phrase(self.status));
        self.emit_with(out, status_line, true, true)
    }

    /// ステータスと `Location` を設定してヘッダーを即時送出し、以降の処理を止める合図を返す
    ///
    /// `HTTP/<version>` のステータス行を書く。CGIの標準出力には `redirect_cgi` を使う。
    pub fn redirect<W: Write>(
        &mut self,
        url: &str,
        status: u16,
        out: &mut W,
    ) -> Result<ControlFlow<()>, Error> {
        self.set_status(status);
        self.set_header("Location", url, true);
        let status_line = format!(
            "HTTP/{} {} {}",
            self.protocol_version,
            self.status,
            reason_phrase(self.status)
        );
        self.emit_with(out, status_line, false, false)?;
        Ok(ControlFlow::Break(()))
    }

    /// `redirect` のCGI版（`Status:` 行で送出する）
    pub fn redirect_cgi<W: Write>(
        &mut self,
        url: &str,
        status: u16,
        out: &mut W,
    ) -> Result<ControlFlow<()>, Error> {
        self.set_status(status);
        self.set_header("Location", url, true);
        let status_line = format!("Status: {} {}", self.status, reason_phrase(self.status));
        self.emit_with(out, status_line, false, true)?;
        Ok(ControlFlow::Break(()))
    }

    fn emit_with<W: Write>(
        &mut self,
        out: &mut W,
        status_line: String,
        with_body: bool,
        cgi: bool,
    ) -> Result<bool, Error> {
        if self.emitted {
            debug!("Response already emitted, skipping");
            return Ok(false);
        }
        // 途中で失敗しても再送出させない
        self.emitted = true;

        out.write_all(status_line.as_bytes())?;
        out.write_all(b"\r\n")?;

        for (name, value) in &self.headers {
            // 予約ヘッダーはフレームワーク側で付与する
            if cgi && (name.eq_ignore_ascii_case("Status") || name.eq_ignore_ascii_case("Content-Length")) {
                continue;
            }
            out.write_all(format!("{}: {}\r\n", name, value).as_bytes())?;
        }
        if cgi && with_body {
            out.write_all(format!("Content-Length: {}\r\n", self.body.len()).as_bytes())?;
        }
        out.write_all(b"\r\n")?;

        if with_body {
            out.write_all(&self.body)?;
        }
        out.flush()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;

    fn split_emitted(bytes: &[u8]) -> (String, Vec<u8>) {
        let text = String::from_utf8_lossy(bytes).to_string();
        let idx = text.find("\r\n\r\n").expect("header terminator");
        (text[..idx].to_string(), bytes[idx + 4..].to_vec())
    }

    #[test]
    fn test_defaults() {
        let res = Response::default();
        assert_eq!(res.status(), 200);
        assert!(res.headers().is_empty());
        assert!(res.body().is_empty());
        assert_eq!(res.protocol_version(), "1.1");
        assert!(!res.is_emitted());
    }

    #[test]
    fn test_set_header_replace_and_append() {
        let mut res = Response::ok();
        res.set_header("Cache-Control", "no-cache", true)
            .set_header("Cache-Control", "no-store", false)
            .set_header("X-Id", "1", true)
            .set_header("X-Id", "2", true)
            .set_header("x-id", "3", true);

        assert_eq!(res.header("Cache-Control"), Some("no-cache, no-store"));
        assert_eq!(res.header("X-Id"), Some("2"));
        // キーは大文字小文字を区別する
        assert_eq!(res.header("x-id"), Some("3"));
        let names: Vec<&str> = res.headers().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["Cache-Control", "X-Id", "x-id"]);

        res.remove_header("X-Id");
        assert_eq!(res.header("X-Id"), None);
        assert_eq!(res.headers().len(), 2);
    }

    #[test]
    fn test_invalid_header_is_rejected() {
        let mut res = Response::ok();
        res.set_header("X-Evil", "evil\r\nInjected: 1", true);
        res.set_header("Bad Name", "v", true);
        assert!(res.headers().is_empty());
    }

    #[test]
    fn test_set_content_type() {
        let mut res = Response::ok();
        res.set_content_type("text/html", "utf-8");
        assert_eq!(res.header("Content-Type"), Some("text/html; charset=utf-8"));
        res.set_content_type("text/plain", "iso-8859-1");
        assert_eq!(res.header("Content-Type"), Some("text/plain; charset=iso-8859-1"));
    }

    #[test]
    fn test_emit_writes_in_order() {
        let mut res = Response::text(201, "created");
        res.set_header("X-First", "1", true).set_header("X-Second", "2", true);

        let mut out = Vec::new();
        assert!(res.emit(&mut out).unwrap());
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "HTTP/1.1 201 Created\r\nX-First: 1\r\nX-Second: 2\r\n\r\ncreated"
        );
    }

    #[test]
    fn test_emit_unknown_status_has_empty_reason() {
        let mut res = Response::new(299);
        res.set_protocol_version("1.0");
        let mut out = Vec::new();
        res.emit(&mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("HTTP/1.0 299 \r\n"));
    }

    #[test]
    fn test_create_json_round_trip_and_single_emit() {
        let mut res = Response::create_json(&json!({"a": 1}), 200, &[("X-Api", "v1")]).unwrap();
        assert_eq!(res.header("Content-Type"), Some("application/json; charset=utf-8"));
        assert_eq!(res.header("X-Api"), Some("v1"));

        let mut out = Vec::new();
        assert!(res.emit(&mut out).unwrap());
        assert!(!res.emit(&mut out).unwrap());
        assert!(res.is_emitted());

        let text = String::from_utf8_lossy(&out).to_string();
        assert_eq!(text.matches("HTTP/1.1 200 OK").count(), 1);

        let (_, body) = split_emitted(&out);
        let decoded: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(decoded, json!({"a": 1}));
    }

    #[test]
    fn test_create_json_rejects_unencodable() {
        // 文字列以外のキーを持つマップはJSONにできない
        let mut data: BTreeMap<Vec<u8>, i32> = BTreeMap::new();
        data.insert(vec![1, 2], 3);
        let result = Response::create_json(&data, 200, &[]);
        assert!(matches!(result, Err(Error::Serialization(_))));
    }

    #[test]
    fn test_create_json_rejects_non_finite_numbers() {
        let mut data: BTreeMap<&str, f64> = BTreeMap::new();
        data.insert("a", f64::NAN);
        let result = Response::create_json(&data, 200, &[]);
        assert!(matches!(result, Err(Error::Serialization(_))));

        data.insert("a", f64::INFINITY);
        assert!(Response::create_json(&data, 200, &[]).is_err());

        data.insert("a", 1.5);
        let res = Response::create_json(&data, 200, &[]).unwrap();
        assert_eq!(res.body(), br#"{"a":1.5}"#);
    }

    #[test]
    fn test_redirect_emits_head_and_stops() {
        let mut res = Response::text(200, "ignored");
        let mut out = Vec::new();
        let flow = res.redirect("/login", 302, &mut out).unwrap();

        assert_eq!(flow, ControlFlow::Break(()));
        assert_eq!(res.status(), 302);
        assert_eq!(
            String::from_utf8(out.clone()).unwrap(),
            "HTTP/1.1 302 Found\r\nLocation: /login\r\n\r\n"
        );

        // 送出済みなので何も書かれない
        assert!(!res.emit(&mut out).unwrap());
    }

    #[test]
    fn test_redirect_cgi_uses_status_line() {
        let mut res = Response::text(200, "ignored");
        let mut out = Vec::new();
        let flow = res.redirect_cgi("/login", 303, &mut out).unwrap();

        assert_eq!(flow, ControlFlow::Break(()));
        assert_eq!(
            String::from_utf8(out.clone()).unwrap(),
            "Status: 303 See Other\r\nLocation: /login\r\n\r\n"
        );
        assert!(!res.emit_cgi(&mut out).unwrap());
    }

    #[test]
    fn test_redirect_to() {
        let res = Response::redirect_to("https://example.com/", 301);
        assert_eq!(res.status(), 301);
        assert_eq!(res.header("Location"), Some("https://example.com/"));
        assert!(!res.is_emitted());
    }

    #[test]
    fn test_emit_cgi() {
        let mut res = Response::text(404, "missing")
            .with_header("Content-Type", "text/plain")
            .with_header("Content-Length", "999")
            .with_header("Status", "200 OK");

        let mut out = Vec::new();
        res.emit_cgi(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Status: 404 Not Found\r\nContent-Type: text/plain\r\nContent-Length: 7\r\n\r\nmissing"
        );
    }

    #[test]
    fn test_from_error() {
        let res = Response::from_error(&Error::MalformedBody("x".into()));
        assert_eq!(res.status(), 400);
        assert_eq!(res.body(), b"Bad Request");

        let res = Response::from_error(&Error::Serialization("x".into()));
        assert_eq!(res.status(), 500);
        assert_eq!(res.body(), b"Internal Server Error");
    }
}
