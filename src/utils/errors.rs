#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("Access unit too short for major_sync_info: {0} bytes")]
    TooShort(usize),

    #[error("major_sync_info header extends past the access unit ({header} > {len})")]
    HeaderTooLong { header: usize, len: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum PackError {
    #[error("Access unit too short for timing field: {0} bytes")]
    UnitTooShort(usize),

    #[error("output_timing must follow the predicted timeline. Read {read}, expected {expected}")]
    OutputTimingMismatch { read: u16, expected: u16 },

    #[error("Pending padding {pending} exceeds {max} bytes, stream discontinuity")]
    PaddingOverflow { pending: usize, max: usize },
}
