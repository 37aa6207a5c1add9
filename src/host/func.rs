//! Host function callable type.

use crate::error::Trap;
use crate::model::Value;

/// A host-provided callable. Arguments arrive as the engine's tagged value
/// union; at most one return value. Errors raised here unwind the current
/// invocation as `Trap::Host`.
pub type HostFunc = dyn Fn(&[Value]) -> Result<Option<Value>, Trap> + Send + Sync;
