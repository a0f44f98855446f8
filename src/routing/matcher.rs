//! パスパターンのマッチング
//!
//! パターンは `/` 区切りのリテラルセグメントと `{name}` プレースホルダーで構成される。
//! ワイルドカードや可変長セグメントはサポートしない。

use std::collections::HashSet;
use std::sync::OnceLock;

use log::debug;
use regex::Regex;

use crate::common::RouteParams;
use crate::error::Error;

/// パターンの構造（リテラルかプレースホルダーか）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    Placeholder,
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\{([A-Za-z0-9_]+)\}$").expect("static regex is valid"))
}

/// セグメントが `{name}` 形式ならその名前を返す
pub fn placeholder_name(segment: &str) -> Option<&str> {
    placeholder_regex()
        .captures(segment)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// パターンをURIに照合し、一致すれば抽出したパラメータを返す
pub fn match_pattern(pattern: &str, uri: &str) -> Option<RouteParams> {
    if pattern == uri {
        return Some(RouteParams::new());
    }

    let pattern_parts: Vec<&str> = pattern.split('/').collect();
    let uri_parts: Vec<&str> = uri.split('/').collect();
    if pattern_parts.len() != uri_parts.len() {
        return None;
    }

    let mut params = RouteParams::new();
    for (expected, actual) in pattern_parts.iter().zip(uri_parts.iter()) {
        match placeholder_name(expected) {
            Some(name) => {
                params.insert(name.to_string(), (*actual).to_string());
            }
            None if expected == actual => {}
            None => return None,
        }
    }

    debug!("Path matching: {} against pattern {}: {:?}", uri, pattern, params);
    Some(params)
}

/// プレースホルダー名が一意であることを確認する
pub fn validate_pattern(pattern: &str) -> Result<(), Error> {
    let mut seen = HashSet::new();
    for name in pattern.split('/').filter_map(placeholder_name) {
        if !seen.insert(name) {
            return Err(Error::InvalidRoutePattern(format!(
                "duplicate placeholder '{{{}}}' in '{}'",
                name, pattern
            )));
        }
    }
    Ok(())
}

/// 重複検出用にパターンの形だけを取り出す
pub fn shape(pattern: &str) -> Vec<Segment<'_>> {
    pattern
        .split('/')
        .map(|s| match placeholder_name(s) {
            Some(_) => Segment::Placeholder,
            None => Segment::Literal(s),
        })
        .collect()
}

/// プレースホルダーにパラメータを埋め込んでURIを生成する
pub fn fill_pattern(pattern: &str, params: &RouteParams) -> Result<String, Error> {
    let parts = pattern
        .split('/')
        .map(|s| match placeholder_name(s) {
            Some(name) => params.get(name).cloned().ok_or_else(|| {
                Error::InvalidRoutePattern(format!(
                    "missing parameter '{}' for pattern '{}'",
                    name, pattern
                ))
            }),
            None => Ok(s.to_string()),
        })
        .collect::<Result<Vec<String>, Error>>()?;
    Ok(parts.join("/"))
}
