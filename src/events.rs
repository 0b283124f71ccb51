use alloy::sol;
use alloy::sol_types::{SolCall, SolEvent};
use alloy_primitives::B256;

sol! {
    function transfer(address to, uint256 value) external returns (bool);
    function transferFrom(address from, address to, uint256 value) external returns (bool);

    event Transfer(address indexed from, address indexed to, uint256 value);
}

/// Encoded length of `transfer(address,uint256)` call data.
pub const TRANSFER_CALL_LEN: usize = 4 + 32 * 2;
/// Encoded length of `transferFrom(address,address,uint256)` call data.
pub const TRANSFER_FROM_CALL_LEN: usize = 4 + 32 * 3;

/// ERC20 method selectors and event topic used to recognise token movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Erc20Abi {
    pub transfer_selector: [u8; 4],
    pub transfer_from_selector: [u8; 4],
    pub transfer_topic: B256,
}

impl Default for Erc20Abi {
    fn default() -> Self {
        Self {
            transfer_selector: transferCall::SELECTOR,
            transfer_from_selector: transferFromCall::SELECTOR,
            transfer_topic: Transfer::SIGNATURE_HASH,
        }
    }
}
