//! Route definitions for the ledger API

mod admin;
mod ledger;
mod loan_requests;
mod loans;
mod members;
mod notices;

pub use admin::admin_routes;
pub use ledger::ledger_routes;
pub use loan_requests::loan_request_routes;
pub use loans::loan_routes;
pub use members::member_routes;
pub use notices::notice_routes;
