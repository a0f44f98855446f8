//! リクエストのディスパッチ
//!
//! マッチング → ミドルウェアチェーン構築 → ハンドラー呼び出しの順に処理し、
//! 404（ルートなし）と500（解決できないアクション）はレスポンスとして返す。

use log::{debug, error, info};

use crate::common::{Next, Request, Response};
use crate::error::Error;
use crate::middleware::{build_chain, terminal};
use crate::routing::Action;
use crate::Router;

/// 解決できないアクションに対するレスポンス本文
pub const INVALID_ACTION_BODY: &str = "Invalid Route Action";

fn invalid_action_response() -> Response {
    Response::text(500, INVALID_ACTION_BODY)
}

impl Router {
    /// リクエストを処理してレスポンスを返す
    ///
    /// ルートの不一致や未解決のアクションはレスポンスになる。
    /// `Err` になるのはハンドラーやミドルウェアが返したエラーのみ。
    pub fn dispatch(&self, req: &Request) -> Result<Response, Error> {
        let method = req.method();
        let uri = req.uri();
        debug!("Dispatching {} {}", method, uri);

        let Some(matched) = self.find(method, uri) else {
            info!("No route for {} {}", method, uri);
            return Ok(Response::not_found());
        };
        let route = matched.route;
        let params = matched.params;
        debug!("Matched {} {} with params {:?}", method, route.pattern(), params);

        let inner = match route.action() {
            Action::Handler(handler) => terminal(handler.as_ref(), &params),
            Action::Unresolved(name) => {
                let pattern = route.pattern();
                Next::new(move |_req| {
                    error!("Unresolved action '{}' for {} {}", name, method, pattern);
                    Ok(invalid_action_response())
                })
            }
        };

        debug!("Running middleware chain for {} {}", method, route.pattern());
        let result = build_chain(self.global_middleware(), route.middleware(), inner).run(req);

        match result {
            Ok(res) => {
                debug!("Responded {} to {} {}", res.status(), method, uri);
                Ok(res)
            }
            Err(Error::InvalidAction(msg)) => {
                error!("Invalid action at {} {}: {}", method, uri, msg);
                Ok(invalid_action_response())
            }
            Err(e) => Err(e),
        }
    }
}
