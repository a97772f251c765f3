use super::ServerStopper;
use log::{debug, info};
use std::sync::atomic::{AtomicU8, Ordering};

/// Stops the server on the first termination signal and exits on the second.
pub struct ShutdownSignal {
    signal_count: AtomicU8,
}

impl ShutdownSignal {
    pub fn new() -> ShutdownSignal {
        ShutdownSignal {
            signal_count: AtomicU8::new(0),
        }
    }

    fn listen_inner<I>(&self, stopper: &ServerStopper, signals: I)
    where
        I: IntoIterator<Item = i32>,
    {
        use std::{process, thread::sleep, time::Duration};

        for signal in signals {
            let previous = self.signal_count.fetch_add(1, Ordering::AcqRel);
            if previous == 0 {
                info!("Got signal {signal}, stopping after the running updates finished.");
                stopper.stop();
            } else {
                // Allow a little time for the clean shutdown to still happen.
                sleep(Duration::from_millis(100));
                debug!("Got signal {signal}, terminating right now.");
                process::exit(signal);
            }
        }
    }

    /// Wait for termination signals (SIGINT, SIGTERM, SIGQUIT) and stop the server.
    #[cfg(unix)]
    pub fn listen(&self, stopper: &ServerStopper) {
        use log::warn;
        use signal_hook::{
            consts::TERM_SIGNALS,
            iterator::{exfiltrator::SignalOnly, SignalsInfo},
        };

        match SignalsInfo::<SignalOnly>::new(TERM_SIGNALS) {
            Ok(mut signals) => self.listen_inner(stopper, &mut signals),
            Err(err) => warn!("Failed setting up signal handler: {err}."),
        }
    }

    #[cfg(not(unix))]
    pub fn listen(&self, _stopper: &ServerStopper) {
        debug!("Signal handlers are not supported on non-unix systems.");
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
