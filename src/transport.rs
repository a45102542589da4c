//! T=0 transport exchange (component F).
//!
//! Grounded on `emv/transmission.py`'s `TransmissionProtocol.exchange`: resolves the two
//! protocol-mandated status quirks before handing a clean [`Rapdu`] up to the session
//! layer.

use crate::apdu::{Capdu, Rapdu};
use crate::channel::Channel;
use crate::Result;
use tracing::{trace, trace_span};

/// Send `capdu` over `channel`, transparently handling:
/// - `6C xx`: wrong `Le`; re-issue the same command once with `Le = xx`.
/// - `61 xx`: more data available; issue `GET RESPONSE` until the card stops saying so,
///   concatenating each chunk's body.
pub fn exchange(channel: &mut dyn Channel, capdu: &Capdu) -> Result<Rapdu> {
    let span = trace_span!("exchange");
    let _enter = span.enter();

    let mut request = capdu.clone();
    let mut response = channel.transmit(&request.marshal())?;
    trace!(?response, "<< RX");

    let (mut sw1, mut sw2) = last_two(&response);
    if sw1 == 0x6C {
        request.set_le(sw2);
        response = channel.transmit(&request.marshal())?;
        trace!(?response, "<< RX (retry with corrected Le)");
        let sws = last_two(&response);
        sw1 = sws.0;
        sw2 = sws.1;
    }

    let mut body = response[..response.len() - 2].to_vec();
    while sw1 == 0x61 {
        let get_response = [0x00, 0xC0, 0x00, 0x00, sw2];
        let chunk = channel.transmit(&get_response)?;
        trace!(?chunk, "<< RX (GET RESPONSE)");
        let sws = last_two(&chunk);
        body.extend_from_slice(&chunk[..chunk.len() - 2]);
        sw1 = sws.0;
        sw2 = sws.1;
    }

    body.push(sw1);
    body.push(sw2);
    Ok(Rapdu::unmarshal(&body))
}

fn last_two(data: &[u8]) -> (u8, u8) {
    (data[data.len() - 2], data[data.len() - 1])
}
