//! 宣言的なルート設定
//!
//! `{path, method, handler, middleware?, name?}` のレコード列を扱う。
//! ファイルの探索やマージは呼び出し側の責務で、ここでは読み込みと解析のみを行う。

use std::fs;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// ルート設定の1レコード
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// URIパターン
    pub path: String,
    /// HTTPメソッド（大文字小文字を区別しない）
    pub method: String,
    /// ハンドラー名（`Controller@method` など）
    pub handler: String,
    /// ミドルウェア名のリスト
    #[serde(default)]
    pub middleware: Vec<String>,
    /// ルート名
    #[serde(default)]
    pub name: Option<String>,
}

impl RouteEntry {
    pub fn new(path: impl Into<String>, method: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
            handler: handler.into(),
            middleware: Vec::new(),
            name: None,
        }
    }

    pub fn with_middleware(mut self, middleware: impl Into<String>) -> Self {
        self.middleware.push(middleware.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// 設定ファイルの形式（リストそのもの、または `{"routes": [...]}`）
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RouteFile {
    List(Vec<RouteEntry>),
    Wrapped { routes: Vec<RouteEntry> },
}

/// JSON文字列からルート設定を解析
pub fn parse_routes(json: &str) -> Result<Vec<RouteEntry>, Error> {
    let file: RouteFile =
        serde_json::from_str(json).map_err(|e| Error::ConfigLoad(format!("invalid route file: {}", e)))?;
    Ok(match file {
        RouteFile::List(routes) | RouteFile::Wrapped { routes } => routes,
    })
}

/// JSONファイルからルート設定を読み込む
pub fn read_route_file(path: impl AsRef<Path>) -> Result<Vec<RouteEntry>, Error> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| Error::ConfigLoad(format!("failed to read {}: {}", path.display(), e)))?;
    let routes = parse_routes(&content)?;
    debug!("Read {} route entries from {}", routes.len(), path.display());
    Ok(routes)
}
