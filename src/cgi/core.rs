//! CGIメイン実行ロジック

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::Arc;

use log::{debug, error, info};
use tokio::task;

use crate::common::Response;
use crate::error::Error;
use crate::Router;
use super::error_logging::{gather_cgi_panic_context, log_error_to_file};
use super::request::{build_request, cgi_vars, read_request_body};
use super::response::write_response_to;

/// 現在のCGI環境・標準入力からリクエストを読み、標準出力に応答する
pub async fn run_cgi(router: Arc<Router>) -> Result<(), Error> {
    let vars = cgi_vars();
    let body = {
        let mut stdin = io::stdin().lock();
        read_request_body(vars.get("CONTENT_LENGTH").map(String::as_str), &mut stdin)
    };

    let response = respond(router, &vars, body).await;
    let mut stdout = io::stdout().lock();
    write_response_to(response, &mut stdout)?;
    stdout.flush()?;

    info!("CGI request processed successfully");
    Ok(())
}

/// 任意の入出力で1リクエストを処理する
pub async fn run_cgi_with<R, W>(
    router: Arc<Router>,
    vars: &HashMap<String, String>,
    input: &mut R,
    out: &mut W,
) -> Result<(), Error>
where
    R: Read,
    W: Write,
{
    let body = read_request_body(vars.get("CONTENT_LENGTH").map(String::as_str), input);
    let response = respond(router, vars, body).await;
    write_response_to(response, out)
}

/// 読み込んだボディからレスポンスを決定する
///
/// ボディ上限超過は413、リクエスト構築の失敗はそのエラーのステータスで応答する。
/// ディスパッチはブロッキングタスクで実行し、panicは500に変換する。
async fn respond(
    router: Arc<Router>,
    vars: &HashMap<String, String>,
    body: Result<Vec<u8>, Error>,
) -> Response {
    let method = vars.get("REQUEST_METHOD").cloned().unwrap_or_else(|| "GET".to_string());
    let path = vars.get("PATH_INFO").cloned().unwrap_or_else(|| "/".to_string());

    let request = match body.and_then(|body| build_request(vars, body)) {
        Ok(req) => req,
        Err(e) => {
            error!("Rejected CGI request {} {}: {}", method, path, e);
            return Response::from_error(&e);
        }
    };

    debug!("Processing CGI request: {} {}", method, path);
    let task_result = task::spawn_blocking(move || router.dispatch(&request)).await;

    match task_result {
        Ok(Ok(res)) => res,
        Ok(Err(err)) => {
            error!("Error processing request: {:?}", err);
            log_error_to_file(&format!("Handler returned error at {} {}: {:?}", method, path, err));
            Response::from_error(&err)
        }
        Err(join_err) => {
            let summary = if join_err.is_panic() {
                "panic occurred in handler".to_string()
            } else {
                format!("task cancelled: {}", join_err)
            };
            error!("{}", summary);
            log_error_to_file(&format!("{} at {} {}", summary, method, path));
            if join_err.is_panic() {
                log_error_to_file(&gather_cgi_panic_context(&method, &path));
            }
            Response::internal_server_error().with_header("Content-Type", "text/plain; charset=utf-8")
        }
    }
}
