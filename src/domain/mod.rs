pub mod order;
pub mod symbol;

pub use order::{
    split_quantity, ExecutionOutcome, ExecutionReport, ExecutionSnapshot, FillEvent, OrderIntent,
    OrderKind, Side, Slice, UnfilledOrder,
};
pub use symbol::normalize_symbol;
