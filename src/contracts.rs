// src/contracts.rs
use ethers::contract::abigen;
use ethers::types::{Address, H160};

abigen!(
    Safe4337Module,
    r#"[
        function executeUserOp(address to, uint256 value, bytes data, uint8 operation)
        function executeUserOpWithErrorString(address to, uint256 value, bytes data, uint8 operation)
    ]"#
);

abigen!(
    MultiSend,
    r#"[
        function multiSend(bytes transactions)
    ]"#
);

abigen!(
    SafeOwnerManager,
    r#"[
        function addOwnerWithThreshold(address owner, uint256 threshold)
    ]"#
);

abigen!(
    EntryPoint,
    r#"[
        function getNonce(address sender, uint192 key) view returns (uint256 nonce)
    ]"#
);

/// Safe v1.4.1 MultiSend (`0x38869bf66a61cF6bDB996A6aE40D5853Fd43B526`), same address on every supported chain.
pub const MULTI_SEND_ADDRESS: Address = H160([
    0x38, 0x86, 0x9b, 0xf6, 0x6a, 0x61, 0xcf, 0x6b, 0xdb, 0x99, 0x6a, 0x6a, 0xe4, 0x0d, 0x58, 0x53,
    0xfd, 0x43, 0xb5, 0x26,
]);

/// Safe v1.4.1 operation tag for a delegate call.
pub const DELEGATE_CALL: u8 = 1;
