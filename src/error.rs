//! エラー型の定義

use thiserror::Error;

/// ルーティングエンジンのエラー型
#[derive(Error, Debug)]
pub enum Error {
    /// ルートが見つからない（dispatchでは404レスポンスに変換される）
    #[error("Route not found: {0}")]
    RouteNotFound(String),

    /// 宣言またはスニッフィングされたJSONボディの解析失敗
    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    /// ハンドラー参照を解決・実行できない
    #[error("Invalid route action: {0}")]
    InvalidAction(String),

    /// レスポンスボディのシリアライズ失敗
    #[error("Failed to serialize response: {0}")]
    Serialization(String),

    /// ルート設定の読み込み失敗
    #[error("Failed to load route configuration: {0}")]
    ConfigLoad(String),

    /// ルートパターンが不正（プレースホルダー名の重複など）
    #[error("Invalid route pattern: {0}")]
    InvalidRoutePattern(String),

    /// 未知のHTTPメソッド
    #[error("Unknown HTTP method: {0}")]
    UnknownMethod(String),

    /// リクエストボディが上限を超えている
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// ミドルウェアエラー
    #[error("Middleware error: {0}")]
    Middleware(String),

    /// トランスポートへの書き込み失敗
    #[error("I/O error: {0}")]
    Io(String),

    /// 内部サーバーエラー
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl Error {
    /// エラーからHTTPステータスコードを取得
    pub fn status_code(&self) -> u16 {
        match self {
            Error::RouteNotFound(_) => 404,
            Error::MalformedBody(_) => 400,
            Error::UnknownMethod(_) => 405,
            Error::PayloadTooLarge(_) => 413,
            Error::InvalidAction(_)
            | Error::Serialization(_)
            | Error::ConfigLoad(_)
            | Error::InvalidRoutePattern(_)
            | Error::Middleware(_)
            | Error::Io(_)
            | Error::InternalServerError(_) => 500,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
