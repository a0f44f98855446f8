//! CGI環境でのエントリポイント
//!
//! CGI環境で実行される際のメインプログラム

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use env_logger::Env;
use log::{error, info};
use routebridge::cgi;

mod sample_handler;

/// 追加のルート設定ファイルを指定する環境変数
const ROUTES_ENV: &str = "ROUTEBRIDGE_ROUTES";

#[tokio::main]
async fn main() {
    // CGIでは標準出力がHTTPレスポンスとなるため、ログは標準エラー出力に出す
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!("Starting RouteBridge CGI application");

    let route_file = env::var(ROUTES_ENV).ok().filter(|p| !p.is_empty()).map(PathBuf::from);
    let router = match sample_handler::build_router(route_file.as_deref()) {
        Ok(router) => Arc::new(router),
        Err(err) => {
            error!("Failed to build router: {}", err);
            cgi::error_logging::log_error_to_file(&format!("Failed to build router: {}", err));
            std::process::exit(1);
        }
    };

    if let Err(err) = cgi::run_cgi(router).await {
        error!("Error running CGI application: {:?}", err);
        std::process::exit(1);
    }
}
