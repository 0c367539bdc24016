#[allow(unused_imports)]
pub(crate) use self::inner::*;

#[cfg(loom)]
mod inner {
    #![allow(dead_code, unused_imports)]

    pub(crate) use loom::thread_local;

    pub(crate) mod sync {
        pub(crate) use loom::sync::*;
    }

    pub(crate) mod thread {
        pub(crate) use loom::thread::{current, park, spawn, yield_now, JoinHandle, Thread};

        /// Loom cannot simulate the passage of time, so a timed park is
        /// modeled as a yield: the caller will observe a spurious wakeup and
        /// re-check its deadline.
        pub(crate) fn park_timeout(_: core::time::Duration) {
            loom::thread::yield_now();
        }
    }

    #[cfg(test)]
    pub(crate) fn model(f: impl Fn() + Sync + Send + 'static) {
        let _trace = crate::util::test::trace_init();
        loom::model(f)
    }
}

#[cfg(not(loom))]
mod inner {
    #![allow(dead_code, unused_imports)]

    pub(crate) use std::thread_local;

    pub(crate) mod sync {
        pub(crate) use std::sync::*;
    }

    pub(crate) mod thread {
        pub(crate) use std::thread::{
            current, park, park_timeout, yield_now, JoinHandle, Thread,
        };

        #[cfg(not(test))]
        pub(crate) use std::thread::spawn;

        #[cfg(test)]
        pub(crate) fn spawn<F, T>(f: F) -> JoinHandle<T>
        where
            F: FnOnce() -> T + Send + 'static,
            T: Send + 'static,
        {
            use core::sync::atomic::{AtomicUsize, Ordering::Relaxed};
            static CHILDREN: AtomicUsize = AtomicUsize::new(1);

            let subscriber = tracing::Dispatch::default();
            let span = tracing::Span::current();
            let num = CHILDREN.fetch_add(1, Relaxed);
            std::thread::spawn(move || {
                let _tracing = tracing::dispatcher::set_default(&subscriber);
                let _span = tracing::info_span!(parent: span, "thread", message = num).entered();

                tracing::info!(num, "spawned child thread");
                let res = f();
                tracing::info!(num, "child thread completed");

                res
            })
        }
    }

    #[cfg(test)]
    pub(crate) fn model(f: impl Fn() + Sync + Send + 'static) {
        let _trace = crate::util::test::trace_init();
        let _span = tracing::info_span!(
            "test",
            message = std::thread::current().name().unwrap_or("<unnamed>")
        )
        .entered();

        tracing::info!("started test...");
        f();
        tracing::info!("test completed successfully!");
    }
}
