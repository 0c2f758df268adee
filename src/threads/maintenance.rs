//! Thin periodic drivers. Each loop dials the local service and invokes one
//! maintenance rpc per tick; the protocol logic lives behind the service, so
//! a failed tick is skipped rather than retried.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::time::sleep;
use tonic::Request;

use crate::threads::chord::chord_proto::Empty;
use crate::threads::transport;
use crate::utils::config::Config;
use crate::utils::types::Address;

const RECONNECT_DELAY: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug)]
pub enum Tick {
    Stabilize,
    FixFingers,
    CheckPredecessor,
    Replicate,
}

impl Tick {
    fn interval(self, config: &Config) -> Duration {
        match self {
            Tick::Stabilize => config.stabilize_interval,
            Tick::FixFingers => config.fix_fingers_interval,
            Tick::CheckPredecessor => config.check_predecessor_interval,
            Tick::Replicate => config.replicate_interval,
        }
    }
}

/// Runs one maintenance rpc against the local service forever, reconnecting
/// when the channel drops.
pub async fn run_tick_loop(local_address: Address, config: Arc<Config>, tick: Tick) {
    let interval = tick.interval(&config);
    loop {
        let Some(mut client) = transport::connect_local(&local_address, config.call_timeout).await
        else {
            debug!("Local service not up yet for the {:?} loop, retrying", tick);
            sleep(RECONNECT_DELAY).await;
            continue;
        };
        loop {
            let result = match tick {
                Tick::Stabilize => client.stabilize(Request::new(Empty {})).await,
                Tick::FixFingers => client.fix_fingers(Request::new(Empty {})).await,
                Tick::CheckPredecessor => client.check_predecessor(Request::new(Empty {})).await,
                Tick::Replicate => client.run_replication(Request::new(Empty {})).await,
            };
            if let Err(e) = result {
                debug!("{:?} tick failed ({}), reconnecting", tick, e);
                break;
            }
            sleep(interval).await;
        }
    }
}
