//! HTTPリクエストの実装
//!
//! トランスポートから受け取った各ソース（クエリ、フォーム、ファイル、クッキー、
//! ヘッダー、生ボディ）を一度だけ取り込み、以降は読み取り専用で公開する。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;

use log::{debug, warn};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;
use super::http::{canonical_header_key, header_lookup_key, Method};
use super::utils::{escape_html, is_header_value_valid, parse_query_string};

/// アップロードされたファイルの記述子
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// クライアント側のファイル名
    pub name: String,
    /// 申告されたMIMEタイプ
    pub content_type: String,
    /// 一時保存先
    pub tmp_path: PathBuf,
    /// バイト数
    pub size: u64,
    /// アップロードエラーコード（0は成功）
    pub error: i32,
}

/// ボディの解析方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
    Unsupported,
}

fn json_content_type() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)application/([a-z0-9.+-]*\+)?json").expect("static regex is valid")
    })
}

fn form_content_type() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)application/x-www-form-urlencoded").expect("static regex is valid")
    })
}

impl BodyKind {
    fn from_content_type(ct: &str) -> Self {
        if json_content_type().is_match(ct) {
            BodyKind::Json
        } else if form_content_type().is_match(ct) {
            BodyKind::Form
        } else {
            BodyKind::Unsupported
        }
    }

    /// Content-Typeが無い場合に生ボディの先頭から推測する
    fn sniff(raw: &[u8]) -> Self {
        let not_at_start = |needle: u8| raw.iter().position(|&b| b == needle).map_or(false, |p| p > 0);
        match raw.first() {
            Some(b'{') | Some(b'[') => BodyKind::Json,
            _ if not_at_start(b'=') && not_at_start(b'&') => BodyKind::Form,
            _ => BodyKind::Unsupported,
        }
    }
}

/// 生ボディをメソッドとContent-Typeに従って構造化する
pub(crate) fn parse_body(
    method: Method,
    content_type: Option<&str>,
    raw: &[u8],
) -> Result<Map<String, Value>, Error> {
    if !method.carries_body() {
        return Ok(Map::new());
    }

    let kind = match content_type {
        Some(ct) => BodyKind::from_content_type(ct),
        None => BodyKind::sniff(raw),
    };

    match kind {
        BodyKind::Json => decode_json_body(raw),
        BodyKind::Form => Ok(parse_query_string(&String::from_utf8_lossy(raw))
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect()),
        BodyKind::Unsupported => Ok(Map::new()),
    }
}

fn decode_json_body(raw: &[u8]) -> Result<Map<String, Value>, Error> {
    let value: Value = serde_json::from_slice(raw).map_err(|e| {
        warn!("Failed to decode JSON request body: {}", e);
        Error::MalformedBody(e.to_string())
    })?;

    Ok(match value {
        Value::Object(map) => map,
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Map::new(),
    })
}

/// HTTPリクエスト（構築後は不変）
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    uri: String,
    query: HashMap<String, String>,
    form: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
    cookies: HashMap<String, String>,
    /// `HTTP_*` 形式のキーで保持する
    headers: HashMap<String, String>,
    raw_body: Vec<u8>,
    body_params: Map<String, Value>,
}

impl Request {
    /// リクエストビルダーを作成
    pub fn builder(method: impl Into<String>, uri: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new().method(method).uri(uri)
    }

    /// HTTPメソッド
    pub fn method(&self) -> Method {
        self.method
    }

    /// 指定メソッドと一致するか（大文字小文字を区別しない）
    pub fn is_method(&self, method: &str) -> bool {
        method.parse::<Method>().map_or(false, |m| m == self.method)
    }

    /// ルーティング対象のパス（クエリ文字列を含まない）
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// クエリパラメータを取得（HTMLエスケープ済み）
    pub fn query(&self, key: &str) -> Option<String> {
        self.query.get(key).map(|v| escape_html(v))
    }

    /// クエリパラメータを取得、無ければデフォルト値（こちらもエスケープされる）
    pub fn query_or(&self, key: &str, default: &str) -> String {
        escape_html(self.query.get(key).map(String::as_str).unwrap_or(default))
    }

    /// 生のクエリパラメータ
    pub fn query_params(&self) -> &HashMap<String, String> {
        &self.query
    }

    /// フォームソースの値（未加工）
    pub fn post(&self, key: &str) -> Option<&str> {
        self.form.get(key).map(String::as_str)
    }

    /// アップロードファイル
    pub fn file(&self, key: &str) -> Option<&UploadedFile> {
        self.files.get(key)
    }

    /// クッキー値
    pub fn cookie(&self, key: &str) -> Option<&str> {
        self.cookies.get(key).map(String::as_str)
    }

    /// ヘッダー値（名前は大文字小文字を区別しない。`HTTP_*` 形式でも引ける）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&header_lookup_key(name)).map(String::as_str)
    }

    pub fn header_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.header(name).unwrap_or(default)
    }

    /// 全ヘッダー（`HTTP_*` キー）
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// リクエスト変数を フォーム -> クエリ -> 解析済みボディ の順で探す
    pub fn var(&self, key: &str) -> Option<Value> {
        if let Some(v) = self.form.get(key) {
            return Some(Value::String(v.clone()));
        }
        if let Some(v) = self.query.get(key) {
            return Some(Value::String(v.clone()));
        }
        self.body_param(key).cloned()
    }

    pub fn var_or(&self, key: &str, default: Value) -> Value {
        self.var(key).unwrap_or(default)
    }

    /// 解析済みボディの値（nullは未設定として扱う）
    pub fn body_param(&self, key: &str) -> Option<&Value> {
        self.body_params.get(key).filter(|v| !v.is_null())
    }

    /// 解析済みボディ全体
    pub fn body_params(&self) -> &Map<String, Value> {
        &self.body_params
    }

    /// クエリ、フォーム、ボディを後勝ちでマージした全パラメータ
    pub fn all(&self) -> Map<String, Value> {
        let mut merged = Map::new();
        for (k, v) in self.query.iter().chain(self.form.iter()) {
            merged.insert(k.clone(), Value::String(v.clone()));
        }
        for (k, v) in &self.body_params {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }

    /// 生ボディ
    pub fn raw_body(&self) -> &[u8] {
        &self.raw_body
    }

    /// ボディを任意の型としてJSONデコード
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.raw_body).map_err(|e| Error::MalformedBody(e.to_string()))
    }
}

/// リクエスト構築のためのビルダー
#[derive(Debug, Clone, Default)]
pub struct RequestBuilder {
    method: Option<String>,
    uri: String,
    query: HashMap<String, String>,
    form: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
    cookies: HashMap<String, String>,
    headers: HashMap<String, String>,
    raw_body: Vec<u8>,
}

impl RequestBuilder {
    /// 新しいRequestBuilderを作成
    pub fn new() -> Self {
        Self {
            uri: "/".to_string(),
            ..Self::default()
        }
    }

    /// HTTPメソッド（未知の値はGETとして扱われる）
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// リクエストURI（`?` 以降はクエリとして取り込む）
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    /// クエリパラメータを追加
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// クエリ文字列をまとめて追加
    pub fn query_string(mut self, query_string: &str) -> Self {
        self.query.extend(parse_query_string(query_string));
        self
    }

    /// フォームソースの値を追加
    pub fn form(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.insert(key.into(), value.into());
        self
    }

    /// アップロードファイルを追加
    pub fn file(mut self, key: impl Into<String>, file: UploadedFile) -> Self {
        self.files.insert(key.into(), file);
        self
    }

    /// クッキーを追加
    pub fn cookie(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(key.into(), value.into());
        self
    }

    /// ヘッダーを追加（制御文字を含む値は拒否）
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if !is_header_value_valid(&value) {
            warn!("Rejected request header '{}' with invalid characters", name);
            return self;
        }
        self.headers.insert(canonical_header_key(name), value);
        self
    }

    /// 生ボディを設定
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.raw_body = body.into();
        self
    }

    /// Requestを構築（宣言または推測されたJSONが壊れていればエラー）
    pub fn build(self) -> Result<Request, Error> {
        let method = match self.method.as_deref() {
            Some(m) => m.parse::<Method>().unwrap_or_else(|_| {
                debug!("Unknown request method '{}', falling back to GET", m);
                Method::GET
            }),
            None => Method::GET,
        };

        let (path, query) = match self.uri.split_once('?') {
            Some((path, qs)) => {
                let mut query = parse_query_string(qs);
                query.extend(self.query);
                (path.to_string(), query)
            }
            None => (self.uri, self.query),
        };

        let content_type = self.headers.get("HTTP_CONTENT_TYPE").map(String::as_str);
        let body_params = parse_body(method, content_type, &self.raw_body)?;

        Ok(Request {
            method,
            uri: path,
            query,
            form: self.form,
            files: self.files,
            cookies: self.cookies,
            headers: self.headers,
            raw_body: self.raw_body,
            body_params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_normalization() {
        let req = Request::builder("post", "/").build().unwrap();
        assert_eq!(req.method(), Method::POST);
        assert!(req.is_method("Post"));

        let req = Request::builder("BREW", "/").build().unwrap();
        assert_eq!(req.method(), Method::GET);

        let req = RequestBuilder::new().build().unwrap();
        assert_eq!(req.method(), Method::GET);
        assert_eq!(req.uri(), "/");
    }

    #[test]
    fn test_uri_query_split() {
        let req = Request::builder("GET", "/search?q=rust&page=2")
            .query("page", "3")
            .build()
            .unwrap();

        assert_eq!(req.uri(), "/search");
        assert_eq!(req.query("q"), Some("rust".to_string()));
        // 明示指定が優先
        assert_eq!(req.query("page"), Some("3".to_string()));
    }

    #[test]
    fn test_query_is_escaped_but_post_is_raw() {
        let req = Request::builder("POST", "/")
            .query("name", "<b>bob</b>")
            .form("name", "<b>alice</b>")
            .build()
            .unwrap();

        assert_eq!(req.query("name"), Some("&lt;b&gt;bob&lt;/b&gt;".to_string()));
        assert_eq!(req.post("name"), Some("<b>alice</b>"));
        assert_eq!(req.query_or("missing", "a&b"), "a&amp;b");
    }

    #[test]
    fn test_var_precedence() {
        let req = Request::builder("POST", "/")
            .header("Content-Type", "application/json")
            .form("key", "from-form")
            .query("key", "from-query")
            .query("only_query", "q")
            .body(r#"{"key":"from-body","only_body":1,"nothing":null}"#)
            .build()
            .unwrap();

        assert_eq!(req.var("key"), Some(json!("from-form")));
        assert_eq!(req.var("only_query"), Some(json!("q")));
        assert_eq!(req.var("only_body"), Some(json!(1)));
        assert_eq!(req.var("nothing"), None);
        assert_eq!(req.var_or("absent", json!("fallback")), json!("fallback"));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let req = Request::builder("GET", "/")
            .header("X-Auth-Token", "secret")
            .header("X-Evil", "a\r\nb: c")
            .build()
            .unwrap();

        assert_eq!(req.header("x-auth-token"), Some("secret"));
        assert_eq!(req.header("X-AUTH-TOKEN"), Some("secret"));
        assert_eq!(req.headers().get("HTTP_X_AUTH_TOKEN"), Some(&"secret".to_string()));
        assert_eq!(req.header("X-Evil"), None);
        assert_eq!(req.header_or("Accept", "*/*"), "*/*");
    }

    #[test]
    fn test_declared_json_body() {
        let req = Request::builder("PUT", "/")
            .header("Content-Type", "application/json; charset=utf-8")
            .body(r#"{"name":"Alice","age":30}"#)
            .build()
            .unwrap();

        assert_eq!(req.body_param("name"), Some(&json!("Alice")));
        assert_eq!(req.body_param("age"), Some(&json!(30)));
    }

    #[test]
    fn test_declared_json_body_malformed() {
        let result = Request::builder("POST", "/")
            .header("Content-Type", "application/json")
            .body("{not json")
            .build();

        assert!(matches!(result, Err(Error::MalformedBody(_))));
    }

    #[test]
    fn test_declared_json_body_empty() {
        for body in ["", "  \n"] {
            let result = Request::builder("POST", "/")
                .header("Content-Type", "application/json")
                .body(body)
                .build();
            assert!(matches!(result, Err(Error::MalformedBody(_))));
        }

        // Content-Type無しの空ボディは解析しない
        let req = Request::builder("POST", "/").body("").build().unwrap();
        assert!(req.body_params().is_empty());
    }

    #[test]
    fn test_prefixed_header_names_do_not_collide() {
        let req = Request::builder("GET", "/")
            .header("Http-Foo", "prefixed")
            .header("Foo", "plain")
            .build()
            .unwrap();

        assert_eq!(req.header("Http-Foo"), Some("prefixed"));
        assert_eq!(req.header("Foo"), Some("plain"));
        assert_eq!(req.header("HTTP_FOO"), Some("plain"));
        assert_eq!(req.header("HTTP_HTTP_FOO"), Some("prefixed"));
    }

    #[test]
    fn test_sniffed_json_body() {
        let req = Request::builder("PATCH", "/").body(r#"["a","b"]"#).build().unwrap();
        assert_eq!(req.body_param("0"), Some(&json!("a")));
        assert_eq!(req.body_param("1"), Some(&json!("b")));

        let result = Request::builder("DELETE", "/").body("{broken").build();
        assert!(matches!(result, Err(Error::MalformedBody(_))));
    }

    #[test]
    fn test_form_body() {
        let req = Request::builder("POST", "/")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body("name=John+Doe&city=Tokyo%20Station")
            .build()
            .unwrap();
        assert_eq!(req.body_param("name"), Some(&json!("John Doe")));
        assert_eq!(req.body_param("city"), Some(&json!("Tokyo Station")));

        // Content-Type無しでも `=` と `&` があればフォームとして扱う
        let req = Request::builder("POST", "/").body("a=1&b=2").build().unwrap();
        assert_eq!(req.body_param("b"), Some(&json!("2")));
    }

    #[test]
    fn test_unparsed_bodies() {
        // GETはボディを解析しない
        let req = Request::builder("GET", "/").body(r#"{"a":1}"#).build().unwrap();
        assert!(req.body_params().is_empty());

        // 推測できないボディは空
        let req = Request::builder("POST", "/").body("just text").build().unwrap();
        assert!(req.body_params().is_empty());
        let req = Request::builder("POST", "/").body("=a&b").build().unwrap();
        assert!(req.body_params().is_empty());

        // 未対応のContent-Typeは空（エラーではない）
        let req = Request::builder("POST", "/")
            .header("Content-Type", "text/plain")
            .body("{")
            .build()
            .unwrap();
        assert!(req.body_params().is_empty());
        assert_eq!(req.raw_body(), b"{");
    }

    #[test]
    fn test_all_merges_sources() {
        let req = Request::builder("POST", "/?a=query&b=query")
            .form("b", "form")
            .header("Content-Type", "application/json")
            .body(r#"{"c":true}"#)
            .build()
            .unwrap();

        let all = req.all();
        assert_eq!(all.get("a"), Some(&json!("query")));
        assert_eq!(all.get("b"), Some(&json!("form")));
        assert_eq!(all.get("c"), Some(&json!(true)));
    }

    #[test]
    fn test_files_and_cookies() {
        let upload = UploadedFile {
            name: "avatar.png".to_string(),
            content_type: "image/png".to_string(),
            tmp_path: PathBuf::from("/tmp/upload-1"),
            size: 1024,
            error: 0,
        };
        let req = Request::builder("POST", "/upload")
            .file("avatar", upload.clone())
            .cookie("session", "abc")
            .build()
            .unwrap();

        assert_eq!(req.file("avatar"), Some(&upload));
        assert_eq!(req.file("other"), None);
        assert_eq!(req.cookie("session"), Some("abc"));
    }

    #[test]
    fn test_typed_json() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Payload {
            name: String,
        }

        let req = Request::builder("POST", "/")
            .header("Content-Type", "application/json")
            .body(r#"{"name":"typed"}"#)
            .build()
            .unwrap();
        let payload: Payload = req.json().unwrap();
        assert_eq!(payload.name, "typed");
    }
}
