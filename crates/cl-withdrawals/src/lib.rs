mod request;
mod schedule;

pub use request::{WITHDRAWAL_FEE_PERCENT, WithdrawalRequest, split_fees};
pub use schedule::{ScheduleError, WithdrawalSchedule};
