//! 共通ユーティリティ関数群（URLデコード、クエリ解析、エスケープ、環境設定 等）

use std::collections::HashMap;
use std::env;

/// リクエストボディ上限の環境変数名
pub const MAX_BODY_SIZE_ENV: &str = "ROUTEBRIDGE_MAX_BODY_SIZE";

/// URLエンコーディングのデコード関数
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                if let (Some(h), Some(l)) = (from_hex(bytes[i + 1]), from_hex(bytes[i + 2])) {
                    result.push(h * 16 + l);
                    i += 3;
                    continue;
                }
                result.push(b'%');
            }
            b'+' => result.push(b' '),
            b => result.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&result).into_owned()
}

/// 16進数文字をバイト値に変換するヘルパー関数
fn from_hex(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// クエリ文字列（およびurlencodedボディ）をパースしてURLデコードを行う
pub fn parse_query_string(query_string: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for pair in query_string.split('&') {
        if pair.is_empty() {
            continue;
        }
        let mut parts = pair.splitn(2, '=');
        if let Some(key) = parts.next() {
            let value = parts.next().unwrap_or("");
            params.insert(percent_decode(key), percent_decode(value));
        }
    }

    params
}

/// HTMLの特殊文字をエンティティへ変換する（`& < > " '`）
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// リクエストボディの最大サイズ（バイト）を取得する
/// 優先順位: 環境変数 `ROUTEBRIDGE_MAX_BODY_SIZE` -> デフォルト 5MB
pub fn get_max_body_size() -> usize {
    const DEFAULT_MAX_SIZE: usize = 5 * 1024 * 1024; // 5MB
    env::var(MAX_BODY_SIZE_ENV)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(DEFAULT_MAX_SIZE)
}

/// ヘッダー値に使用可能な文字かを判定（CRLF・制御文字を拒否、HTABは許可）
pub fn is_header_value_valid(value: &str) -> bool {
    value.chars().all(|c| {
        let code = c as u32;
        c == '\t' || (code >= 0x20 && code != 0x7F)
    })
}

/// ヘッダー名が安全なトークンかを判定
pub fn is_header_name_valid(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    // token = 1*tchar
    name.chars().all(|c| {
        c.is_ascii_alphanumeric()
            || matches!(c, '!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '.' | '^' | '_' | '`' | '|' | '~')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_string() {
        let params = parse_query_string("name=John&age=30&city=Tokyo");

        assert_eq!(params.get("name"), Some(&"John".to_string()));
        assert_eq!(params.get("age"), Some(&"30".to_string()));
        assert_eq!(params.get("city"), Some(&"Tokyo".to_string()));
    }

    #[test]
    fn test_parse_query_string_edge_cases() {
        assert!(parse_query_string("").is_empty());

        let params = parse_query_string("flag&empty=&&a=1");
        assert_eq!(params.get("flag"), Some(&String::new()));
        assert_eq!(params.get("empty"), Some(&String::new()));
        assert_eq!(params.get("a"), Some(&"1".to_string()));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("Hello%20World"), "Hello World");
        assert_eq!(percent_decode("test%2Bvalue"), "test+value");
        assert_eq!(percent_decode("plus+space"), "plus space");
        assert_eq!(percent_decode("%E3%81%82%E3%81%84"), "あい");
        // 不完全なエスケープはそのまま残す
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#039;Jerry&#039;&lt;/a&gt;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn header_value_rejects_crlf_and_ctl() {
        assert!(is_header_value_valid("normal-Value_123"));
        assert!(is_header_value_valid("with\ttab"));
        assert!(is_header_value_valid(""));
        assert!(!is_header_value_valid("bad\rvalue"));
        assert!(!is_header_value_valid("bad\nvalue"));
        assert!(!is_header_value_valid("bad\x07bell"));
    }

    #[test]
    fn header_name_must_be_token() {
        assert!(is_header_name_valid("X-Request-Id"));
        assert!(!is_header_name_valid(""));
        assert!(!is_header_name_valid("Bad Name"));
        assert!(!is_header_name_valid("Bad:Name"));
    }

    #[test]
    fn test_get_max_body_size() {
        use temp_env::with_var;

        with_var(MAX_BODY_SIZE_ENV, None::<&str>, || {
            assert_eq!(get_max_body_size(), 5 * 1024 * 1024);
        });
        with_var(MAX_BODY_SIZE_ENV, Some("1048576"), || {
            assert_eq!(get_max_body_size(), 1048576);
        });
        with_var(MAX_BODY_SIZE_ENV, Some("invalid"), || {
            assert_eq!(get_max_body_size(), 5 * 1024 * 1024);
        });
    }
}
