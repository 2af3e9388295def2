/// Storage worker: the drive list, then the same list with SMART health.
use super::Publisher;
use crate::drives;
use crate::error::WorkerError;
use crate::platform::HostEnv;
use crate::probe::UNKNOWN;
use crate::snapshot::{InfoKey, InfoValue};

use tracing::info;

pub fn run(host: &HostEnv, out: &Publisher) -> Result<(), WorkerError> {
    let mut list = drives::enumerate_drives(host);
    out.publish(InfoKey::Drives, InfoValue::Drives(list.clone()));

    if list.iter().any(|d| !d.synthetic) {
        drives::annotate_health(host, &mut list);
        let rated = list.iter().filter(|d| d.health != UNKNOWN).count();
        if rated > 0 {
            info!("SMART health read for {rated} of {} drive(s)", list.len());
            out.publish(InfoKey::Drives, InfoValue::Drives(list));
        }
    }
    Ok(())
}
