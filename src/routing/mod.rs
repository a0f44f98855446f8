//! ルーティング（テーブル、マッチャー、名前解決、設定）

pub mod config;
pub mod matcher;
pub mod registry;
pub mod table;

pub use config::{parse_routes, read_route_file, RouteEntry};
pub use matcher::match_pattern;
pub use registry::{action_name, ActionRegistry, ControllerMethod};
pub use table::{Action, Route, RouteMatch, RouteTable};
