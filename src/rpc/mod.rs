//! Named procedures that touch several tables as one unit.
//!
//! Built-ins:
//! - `refund_order(order_id)`: credit the order amount to its owner, cancel
//!   the order, record a refund transaction
//! - `get_user_balance(_user_id)`
//! - `has_role(_user_id, _role)`
//!
//! Unknown names yield an `Unsupported` error ("Function not found").

mod dispatcher;
pub mod procedures;

pub use dispatcher::{Procedure, RpcDispatcher};
