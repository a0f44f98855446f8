//! CGIレスポンスの出力

use std::io::Write;

use crate::common::Response;
use crate::error::Error;

/// レスポンスをCGI形式で任意のライターへ書き出す
///
/// 連結された `Set-Cookie` は1クッキー1行に分割してから送出する。
pub fn write_response_to<W: Write>(mut response: Response, out: &mut W) -> Result<(), Error> {
    let cookies: Vec<String> = response
        .headers()
        .iter()
        .filter(|(name, _)| name == "Set-Cookie")
        .flat_map(|(_, value)| split_set_cookie_header(value))
        .collect();
    if !cookies.is_empty() {
        response.remove_header("Set-Cookie");
        for cookie in cookies {
            response.push_header_line("Set-Cookie", cookie);
        }
    }

    response.emit_cgi(out)?;
    Ok(())
}

/// `, ` で連結された `Set-Cookie` の値をクッキーごとに分割する
///
/// `Expires=` 属性内のカンマでは分割しない。
pub fn split_set_cookie_header(value: &str) -> Vec<String> {
    let mut cookies = Vec::new();
    let mut current = String::new();
    let mut in_expires = false;
    let mut rest = value;

    while let Some(ch) = rest.chars().next() {
        rest = &rest[ch.len_utf8()..];
        match ch {
            ';' => {
                in_expires = false;
                current.push(ch);
            }
            ',' if !in_expires && starts_cookie_pair(rest) => {
                let done = current.trim();
                if !done.is_empty() {
                    cookies.push(done.to_string());
                }
                current.clear();
                rest = rest.trim_start_matches(' ');
            }
            _ => {
                current.push(ch);
                let attr = current.len().checked_sub(8).and_then(|start| current.get(start..));
                if attr.map_or(false, |a| a.eq_ignore_ascii_case("expires=")) {
                    in_expires = true;
                }
            }
        }
    }

    let tail = current.trim();
    if !tail.is_empty() {
        cookies.push(tail.to_string());
    }
    cookies
}

/// 次のトークンが `name=` で始まるか（`;` や `,` より前に `=` がある）
fn starts_cookie_pair(rest: &str) -> bool {
    rest.trim_start_matches(' ')
        .chars()
        .take_while(|c| *c != ';' && *c != ',')
        .any(|c| c == '=')
}
