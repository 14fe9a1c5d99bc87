//! Command/response exchange over an open channel

use bytes::Bytes;
use tracing::{debug, trace};

use crate::card::CardHandle;
use crate::error::{Error, Result};

/// Shortest response a card can legally return: the status word
const MIN_RESPONSE_LEN: usize = 2;

/// Forward `command` once to the connected handle and validate the response
pub(crate) fn transceive(handle: Option<&mut CardHandle>, command: &[u8]) -> Result<Bytes> {
    let Some(handle) = handle else {
        return Err(Error::transmission("no open channel"));
    };

    let response = handle
        .transmit_raw(command)
        .map_err(|source| Error::Transmission {
            message: "transport failure".to_string(),
            source: Some(source),
        })?;

    if response.len() < MIN_RESPONSE_LEN {
        debug!(len = response.len(), "Response too short to carry a status word");
        return Err(Error::transmission(format!(
            "response of {} byte(s) has no status word",
            response.len()
        )));
    }

    let sw = &response[response.len() - MIN_RESPONSE_LEN..];
    trace!(
        len = response.len(),
        sw = %hex::encode_upper(sw),
        "Exchanged APDU"
    );
    Ok(response)
}
