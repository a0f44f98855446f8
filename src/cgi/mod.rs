//! CGI環境での実行をサポートするモジュール
//!
//! 環境変数と標準入力からリクエストを構築し、
//! 標準出力にCGIレスポンス形式で出力する。

pub mod core;
pub mod error_logging;
pub mod request;
pub mod response;

pub use self::core::{run_cgi, run_cgi_with};
