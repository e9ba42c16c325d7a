//! Final-chain account state: balance and nonce, keyed by address.

use serde::{Deserialize, Serialize};

use chronx_core::types::{Address, Balance, Nonce};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub balance: Balance,
    pub nonce: Nonce,
}

impl Account {
    pub fn new(address: Address) -> Self {
        Self { address, balance: 0, nonce: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_starts_at_zero() {
        let acc = Account::new(Address::ZERO);
        assert_eq!(acc.balance, 0);
        assert_eq!(acc.nonce, 0);
    }
}
