//! Sorting captured frames into acquisition datagrams and everything else

use std::fmt;

use etherparse::{SlicedPacket, TransportSlice};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind<'a> {
    /// UDP to the acquisition port, with its payload
    Acquisition(&'a [u8]),
    OtherUdp { port: u16 },
    /// Parsed fine but not UDP
    NotUdp,
    Malformed,
}

/// Classify one Ethernet frame against the acquisition `port`
pub fn classify(frame: &[u8], port: u16) -> FrameKind<'_> {
    match SlicedPacket::from_ethernet(frame) {
        Ok(v) => match v.transport {
            Some(TransportSlice::Udp(udp)) if udp.destination_port() == port => {
                FrameKind::Acquisition(v.payload)
            }
            Some(TransportSlice::Udp(udp)) => FrameKind::OtherUdp {
                port: udp.destination_port(),
            },
            _ => FrameKind::NotUdp,
        },
        Err(e) => {
            trace!("Malformed ethernet frame - {}", e);
            FrameKind::Malformed
        }
    }
}

/// Running counts of what went past on the link
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatagramCounter {
    pub port: u16,
    pub acquisition: u64,
    pub acquisition_payload_bytes: u64,
    pub other_udp: u64,
    pub not_udp: u64,
    pub malformed: u64,
}

impl DatagramCounter {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    pub fn observe(&mut self, frame: &[u8]) {
        match classify(frame, self.port) {
            FrameKind::Acquisition(payload) => {
                self.acquisition += 1;
                self.acquisition_payload_bytes += payload.len() as u64;
            }
            FrameKind::OtherUdp { .. } => self.other_udp += 1,
            FrameKind::NotUdp => self.not_udp += 1,
            FrameKind::Malformed => self.malformed += 1,
        }
    }

    /// Count every frame in `frames`
    pub fn tally<'a>(port: u16, frames: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let mut counter = Self::new(port);
        for frame in frames {
            counter.observe(frame);
        }
        counter
    }

    pub fn total(&self) -> u64 {
        self.acquisition + self.other_udp + self.not_udp + self.malformed
    }
}

impl fmt::Display for DatagramCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} acquisition datagrams ({} payload bytes) on port {}, {} other UDP, {} non-UDP, {} malformed",
            self.acquisition,
            self.acquisition_payload_bytes,
            self.port,
            self.other_udp,
            self.not_udp,
            self.malformed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ACQUISITION_PORT;
    use etherparse::PacketBuilder;

    fn udp_frame(dest_port: u16, payload: &[u8]) -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([2, 0, 0, 0, 0, 1], [2, 0, 0, 0, 0, 2])
            .ipv4([192, 168, 1, 10], [192, 168, 1, 1], 64)
            .udp(40000, dest_port);
        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut frame, payload).unwrap();
        frame
    }

    #[test]
    fn acquisition_payload_is_exposed() {
        let frame = udp_frame(ACQUISITION_PORT, &[1, 2, 3, 4]);
        assert_eq!(
            classify(&frame, ACQUISITION_PORT),
            FrameKind::Acquisition(&[1, 2, 3, 4])
        );
    }

    #[test]
    fn counter_sorts_mixed_traffic() {
        let frames = vec![
            udp_frame(ACQUISITION_PORT, &[0; 64]),
            udp_frame(ACQUISITION_PORT, &[0; 36]),
            udp_frame(53, &[0; 10]),
            vec![0xff; 6],
        ];
        let counter = DatagramCounter::tally(ACQUISITION_PORT, frames.iter().map(Vec::as_slice));
        assert_eq!(counter.acquisition, 2);
        assert_eq!(counter.acquisition_payload_bytes, 100);
        assert_eq!(counter.other_udp, 1);
        assert_eq!(counter.malformed, 1);
        assert_eq!(counter.total(), 4);
    }
}
