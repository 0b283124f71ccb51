use crate::chain::RawTransaction;
use crate::events::{
    Erc20Abi, TRANSFER_CALL_LEN, TRANSFER_FROM_CALL_LEN, Transfer as TransferEvent, transferCall,
    transferFromCall,
};
use alloy::sol_types::{SolCall, SolEvent};
use alloy_primitives::{Address, Log, U256};
use tracing::debug;

/// Economic sender, recipient and amount of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferParties {
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    NativeTransfer(TransferParties),
    Erc20Transfer {
        contract_address: Address,
        transfer: TransferParties,
    },
    Unknown,
}

#[derive(Debug, Clone, Default)]
pub struct TransferDecoder {
    abi: Erc20Abi,
}

impl TransferDecoder {
    pub fn new(abi: Erc20Abi) -> Self {
        Self { abi }
    }

    pub fn classify(&self, tx: &RawTransaction) -> Classification {
        let Some(to) = tx.to else {
            return Classification::Unknown;
        };

        if tx.input.is_empty() {
            if tx.value.is_zero() {
                return Classification::Unknown;
            }
            return Classification::NativeTransfer(TransferParties {
                from: tx.from,
                to,
                value: tx.value,
            });
        }

        let input = tx.input.as_ref();
        if input.len() < 4 {
            return Classification::Unknown;
        }
        let (selector, args) = input.split_at(4);

        let transfer = if selector == self.abi.transfer_selector && input.len() == TRANSFER_CALL_LEN
        {
            transferCall::abi_decode_raw(args)
                .map(|call| TransferParties {
                    from: tx.from,
                    to: call.to,
                    value: call.value,
                })
                .ok()
        } else if selector == self.abi.transfer_from_selector
            && input.len() == TRANSFER_FROM_CALL_LEN
        {
            transferFromCall::abi_decode_raw(args)
                .map(|call| TransferParties {
                    from: call.from,
                    to: call.to,
                    value: call.value,
                })
                .ok()
        } else {
            None
        };

        match transfer {
            Some(transfer) => Classification::Erc20Transfer {
                contract_address: to,
                transfer,
            },
            None => {
                debug!("Transaction {:?} is not a recognised transfer", tx.hash);
                Classification::Unknown
            }
        }
    }

    /// Addresses with a stake in the transaction: the outer sender and
    /// recipient, plus the decoded token sender and recipient.
    pub fn participants(&self, tx: &RawTransaction) -> Vec<Address> {
        let mut addresses = vec![tx.from];
        addresses.extend(tx.to);

        if let Classification::Erc20Transfer { transfer, .. } = self.classify(tx) {
            addresses.push(transfer.from);
            addresses.push(transfer.to);
        }

        addresses.retain(|address| !address.is_zero());
        addresses.sort();
        addresses.dedup();
        addresses
    }

    /// Decodes a `Transfer(address,address,uint256)` log, `None` if the log
    /// has another shape.
    pub fn decode_transfer_event(&self, log: &Log) -> Option<TransferParties> {
        let topics = log.topics();
        if topics.len() != 3 || topics[0] != self.abi.transfer_topic || log.data.data.len() != 32 {
            return None;
        }

        match TransferEvent::decode_raw_log(topics.iter().copied(), &log.data.data) {
            Ok(event) => Some(TransferParties {
                from: event.from,
                to: event.to,
                value: event.value,
            }),
            Err(e) => {
                debug!("Failed to decode transfer event: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{B256, Bytes, LogData, address, b256};

    const SENDER: Address = address!("0x1111111111111111111111111111111111111111");
    const RECIPIENT: Address = address!("0x2222222222222222222222222222222222222222");
    const TOKEN: Address = address!("0x3333333333333333333333333333333333333333");

    fn raw(to: Option<Address>, value: U256, input: Vec<u8>) -> RawTransaction {
        RawTransaction {
            hash: b256!("0x00000000000000000000000000000000000000000000000000000000000000aa"),
            from: SENDER,
            to,
            value,
            input: Bytes::from(input),
            gas: 21_000,
            gas_price: Some(1_000_000_000),
        }
    }

    #[test]
    fn selectors_match_erc20() {
        let abi = Erc20Abi::default();
        assert_eq!(abi.transfer_selector, [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(abi.transfer_from_selector, [0x23, 0xb8, 0x72, 0xdd]);
    }

    #[test]
    fn plain_value_transfer_is_native() {
        let decoder = TransferDecoder::default();
        let tx = raw(Some(RECIPIENT), U256::from(10u64).pow(U256::from(18)), vec![]);

        assert_eq!(
            decoder.classify(&tx),
            Classification::NativeTransfer(TransferParties {
                from: SENDER,
                to: RECIPIENT,
                value: tx.value,
            })
        );
    }

    #[test]
    fn zero_value_without_call_data_is_unknown() {
        let decoder = TransferDecoder::default();
        assert_eq!(
            decoder.classify(&raw(Some(RECIPIENT), U256::ZERO, vec![])),
            Classification::Unknown
        );
    }

    #[test]
    fn contract_creation_is_unknown() {
        let decoder = TransferDecoder::default();
        assert_eq!(
            decoder.classify(&raw(None, U256::from(5u64), vec![])),
            Classification::Unknown
        );
    }

    #[test]
    fn transfer_call_uses_token_contract_as_contract_address() {
        let decoder = TransferDecoder::default();
        let input = transferCall {
            to: RECIPIENT,
            value: U256::from(500u64),
        }
        .abi_encode();
        let tx = raw(Some(TOKEN), U256::ZERO, input);

        assert_eq!(
            decoder.classify(&tx),
            Classification::Erc20Transfer {
                contract_address: TOKEN,
                transfer: TransferParties {
                    from: SENDER,
                    to: RECIPIENT,
                    value: U256::from(500u64),
                },
            }
        );
    }

    #[test]
    fn transfer_from_call_decodes_owner() {
        let decoder = TransferDecoder::default();
        let owner = address!("0x4444444444444444444444444444444444444444");
        let input = transferFromCall {
            from: owner,
            to: RECIPIENT,
            value: U256::from(7u64),
        }
        .abi_encode();

        match decoder.classify(&raw(Some(TOKEN), U256::ZERO, input)) {
            Classification::Erc20Transfer {
                contract_address,
                transfer,
            } => {
                assert_eq!(contract_address, TOKEN);
                assert_eq!(transfer.from, owner);
                assert_eq!(transfer.to, RECIPIENT);
                assert_eq!(transfer.value, U256::from(7u64));
            }
            other => panic!("unexpected classification {other:?}"),
        }
    }

    #[test]
    fn truncated_transfer_call_is_unknown() {
        let decoder = TransferDecoder::default();
        let mut input = transferCall {
            to: RECIPIENT,
            value: U256::from(1u64),
        }
        .abi_encode();
        input.truncate(TRANSFER_CALL_LEN - 1);

        assert_eq!(
            decoder.classify(&raw(Some(TOKEN), U256::ZERO, input)),
            Classification::Unknown
        );
    }

    #[test]
    fn other_method_is_unknown() {
        let decoder = TransferDecoder::default();
        let input = vec![0x09, 0x5e, 0xa7, 0xb3, 0, 0, 0, 0];
        assert_eq!(
            decoder.classify(&raw(Some(TOKEN), U256::from(1u64), input)),
            Classification::Unknown
        );
    }

    #[test]
    fn participants_include_decoded_recipient() {
        let decoder = TransferDecoder::default();
        let input = transferCall {
            to: RECIPIENT,
            value: U256::from(1u64),
        }
        .abi_encode();

        let mut expected = vec![SENDER, RECIPIENT, TOKEN];
        expected.sort();
        assert_eq!(
            decoder.participants(&raw(Some(TOKEN), U256::ZERO, input)),
            expected
        );
    }

    fn transfer_log(topics: Vec<B256>, data: Vec<u8>) -> Log {
        Log {
            address: TOKEN,
            data: LogData::new_unchecked(topics, Bytes::from(data)),
        }
    }

    #[test]
    fn decodes_transfer_event() {
        let decoder = TransferDecoder::default();
        let log = transfer_log(
            vec![
                TransferEvent::SIGNATURE_HASH,
                SENDER.into_word(),
                RECIPIENT.into_word(),
            ],
            U256::from(42u64).to_be_bytes::<32>().to_vec(),
        );

        assert_eq!(
            decoder.decode_transfer_event(&log),
            Some(TransferParties {
                from: SENDER,
                to: RECIPIENT,
                value: U256::from(42u64),
            })
        );
    }

    #[test]
    fn rejects_event_with_wrong_shape() {
        let decoder = TransferDecoder::default();
        let missing_topic = transfer_log(
            vec![TransferEvent::SIGNATURE_HASH, SENDER.into_word()],
            U256::from(1u64).to_be_bytes::<32>().to_vec(),
        );
        let other_event = transfer_log(
            vec![B256::repeat_byte(0x01), SENDER.into_word(), RECIPIENT.into_word()],
            U256::from(1u64).to_be_bytes::<32>().to_vec(),
        );
        let short_data = transfer_log(
            vec![
                TransferEvent::SIGNATURE_HASH,
                SENDER.into_word(),
                RECIPIENT.into_word(),
            ],
            vec![0u8; 16],
        );

        assert_eq!(decoder.decode_transfer_event(&missing_topic), None);
        assert_eq!(decoder.decode_transfer_event(&other_event), None);
        assert_eq!(decoder.decode_transfer_event(&short_data), None);
    }
}
