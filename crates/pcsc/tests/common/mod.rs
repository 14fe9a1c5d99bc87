//! Common test utilities

#![allow(dead_code, unreachable_pub)]

use pcsc::{Context, Scope};

use nexum_apdu_transport_pcsc::{PcscDeviceManager, PcscReader};

/// Try to get a real PC/SC context for tests
pub fn get_pcsc_context() -> Option<Context> {
    Context::establish(Scope::User).ok()
}

/// Try to get a manager and the first reader that holds a card
pub fn get_reader_with_card() -> Option<(PcscDeviceManager, PcscReader)> {
    get_pcsc_context()?;
    let manager = PcscDeviceManager::new().ok()?;
    let reader = manager
        .list_readers()
        .ok()?
        .into_iter()
        .find(PcscReader::has_card)?;
    Some((manager, reader))
}
