//! Reliable Transfer: double-read verification with bounded retry.
//!
//! Bits on a software-clocked line get lost or flipped now and then. A block is
//! only trusted when two consecutive reads agree. This is the only place in
//! the crate that retries.

use crate::error::{ProtocolError, WeatherError};
use crate::framer::Framer;
use crate::memory_map::{self, Address};
use crate::serial_line::ControlLines;

/// Blocks above this length are never legitimately all zero.
const ZERO_CHECK_THRESHOLD: usize = 10;

/// Unverified block reads from device memory.
pub trait MemoryBus {
    fn read_block(&mut self, address: Address, length: usize) -> Result<Vec<u8>, WeatherError>;
}

impl<L: ControlLines> MemoryBus for Framer<L> {
    fn read_block(&mut self, address: Address, length: usize) -> Result<Vec<u8>, WeatherError> {
        self.start_sequence()?;
        self.read_data(address, length)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryReason {
    Empty,
    Mismatch,
    AllZero,
}

#[derive(Debug)]
enum ReadState {
    Reading { attempt: usize },
    Verifying { attempt: usize, first: Vec<u8>, second: Vec<u8> },
    Retrying { attempt: usize, reason: RetryReason },
    Succeeded(Vec<u8>),
    Failed { attempts: usize },
}

fn verify(first: &[u8], second: &[u8], length: usize) -> Option<RetryReason> {
    if first.len() != length {
        return Some(RetryReason::Empty);
    }
    if first != second {
        return Some(RetryReason::Mismatch);
    }
    if length > ZERO_CHECK_THRESHOLD && first.iter().all(|&b| b == 0) {
        return Some(RetryReason::AllZero);
    }
    None
}

/// Read `length` bytes at `address`, accepting them only once two reads agree.
///
/// Gives up with [`ProtocolError::ReadFailed`] after `max_attempts` read pairs.
/// Hardware errors are not retried.
pub fn read_verified<B: MemoryBus + ?Sized>(
    bus: &mut B,
    address: Address,
    length: usize,
    max_attempts: usize,
) -> Result<Vec<u8>, WeatherError> {
    memory_map::check_range(address.value().into(), length, memory_map::HISTORY_END)?;

    let mut state = ReadState::Reading { attempt: 1 };
    loop {
        state = match state {
            ReadState::Reading { attempt } if attempt > max_attempts => ReadState::Failed {
                attempts: max_attempts,
            },
            ReadState::Reading { attempt } => {
                let first = bus.read_block(address, length)?;
                let second = bus.read_block(address, length)?;
                ReadState::Verifying {
                    attempt,
                    first,
                    second,
                }
            }
            ReadState::Verifying {
                attempt,
                first,
                second,
            } => match verify(&first, &second, length) {
                None => ReadState::Succeeded(first),
                Some(reason) => ReadState::Retrying { attempt, reason },
            },
            ReadState::Retrying { attempt, reason } => {
                log::debug!(
                    "Read of {} bytes at {} rejected ({:?}), attempt {}/{}",
                    length,
                    address,
                    reason,
                    attempt,
                    max_attempts
                );
                ReadState::Reading {
                    attempt: attempt + 1,
                }
            }
            ReadState::Succeeded(data) => return Ok(data),
            ReadState::Failed { attempts } => {
                log::warn!("Giving up on {} bytes at {}", length, address);
                return Err(ProtocolError::ReadFailed {
                    address,
                    length,
                    attempts,
                }
                .into());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Answers block reads from a queue, repeating the last answer when it runs dry.
    struct ScriptedBus {
        answers: VecDeque<Vec<u8>>,
        last: Vec<u8>,
        calls: usize,
    }

    impl ScriptedBus {
        fn new(answers: &[&[u8]]) -> Self {
            Self {
                answers: answers.iter().map(|a| a.to_vec()).collect(),
                last: Vec::new(),
                calls: 0,
            }
        }
    }

    impl MemoryBus for ScriptedBus {
        fn read_block(&mut self, _address: Address, _length: usize) -> Result<Vec<u8>, WeatherError> {
            self.calls += 1;
            if let Some(answer) = self.answers.pop_front() {
                self.last = answer;
            }
            Ok(self.last.clone())
        }
    }

    fn addr(raw: u16) -> Address {
        Address::new(raw).unwrap()
    }

    #[test]
    fn test_first_matching_pair_succeeds() {
        let mut bus = ScriptedBus::new(&[&[1, 2, 3], &[1, 2, 3]]);
        let data = read_verified(&mut bus, addr(0x0064), 3, 20).unwrap();
        assert_eq!(data, vec![1, 2, 3]);
        assert_eq!(bus.calls, 2);
    }

    #[test]
    fn test_mismatch_is_retried() {
        let mut bus = ScriptedBus::new(&[&[1, 2, 3], &[1, 6, 3], &[1, 2, 3], &[1, 2, 3]]);
        let data = read_verified(&mut bus, addr(0x0064), 3, 20).unwrap();
        assert_eq!(data, vec![1, 2, 3]);
        assert_eq!(bus.calls, 4);
    }

    #[test]
    fn test_empty_read_is_retried() {
        let mut bus = ScriptedBus::new(&[&[], &[], &[7], &[7]]);
        assert_eq!(read_verified(&mut bus, addr(0x000C), 1, 20).unwrap(), vec![7]);
        assert_eq!(bus.calls, 4);
    }

    #[test]
    fn test_long_all_zero_block_fails_after_bound() {
        let zeros = [0u8; 16];
        let mut bus = ScriptedBus::new(&[&zeros]);
        let err = read_verified(&mut bus, addr(0x0100), 16, 20).unwrap_err();
        assert_eq!(
            err.as_protocol(),
            Some(&ProtocolError::ReadFailed {
                address: addr(0x0100),
                length: 16,
                attempts: 20,
            })
        );
        assert_eq!(bus.calls, 40);
    }

    #[test]
    fn test_short_all_zero_block_is_accepted() {
        let zeros = [0u8; 10];
        let mut bus = ScriptedBus::new(&[&zeros]);
        assert_eq!(read_verified(&mut bus, addr(0x0100), 10, 20).unwrap(), zeros);
    }

    #[test]
    fn test_persistent_mismatch_fails() {
        let mut bus = ScriptedBus::new(&[]);
        bus.answers = (0..100u8).map(|i| vec![i]).collect();
        let err = read_verified(&mut bus, addr(0x0000), 1, 5).unwrap_err();
        assert!(matches!(
            err.as_protocol(),
            Some(ProtocolError::ReadFailed { attempts: 5, .. })
        ));
        assert_eq!(bus.calls, 10);
    }

    #[test]
    fn test_out_of_range_does_no_io() {
        let mut bus = ScriptedBus::new(&[&[1]]);
        let err = read_verified(&mut bus, addr(0x7FFF), 2, 20).unwrap_err();
        assert!(matches!(
            err.as_protocol(),
            Some(ProtocolError::AddressOutOfRange { .. })
        ));
        assert_eq!(bus.calls, 0);
    }
}
