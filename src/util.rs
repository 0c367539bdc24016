//! Internal macros and test helpers.

#[cfg(any(test, feature = "tracing"))]
macro_rules! trace {
    ($($t:tt)*) => { tracing::trace!($($t)*) }
}

#[cfg(not(any(test, feature = "tracing")))]
macro_rules! trace {
    ($($t:tt)*) => {};
}

#[cfg(any(test, feature = "tracing"))]
macro_rules! debug {
    ($($t:tt)*) => { tracing::debug!($($t)*) }
}

#[cfg(not(any(test, feature = "tracing")))]
macro_rules! debug {
    ($($t:tt)*) => {};
}

#[cfg(not(test))]
macro_rules! test_dbg {
    ($e:expr) => {
        $e
    };
}

#[cfg(test)]
macro_rules! test_dbg {
    ($e:expr) => {
        match $e {
            e => {
                tracing::debug!(
                    location = %core::panic::Location::caller(),
                    "{} = {:?}",
                    stringify!($e),
                    &e
                );
                e
            }
        }
    };
}

#[cfg(not(test))]
macro_rules! test_debug {
    ($($t:tt)*) => {};
}

#[cfg(test)]
macro_rules! test_debug {
    ($($t:tt)*) => { tracing::debug!($($t)*) }
}

#[cfg(not(test))]
macro_rules! enter_test_debug_span {
    ($($args:tt)+) => {};
}

#[cfg(test)]
macro_rules! enter_test_debug_span {
    ($($args:tt)+) => {
        let _span = tracing::debug_span!($($args)+).entered();
    };
}
