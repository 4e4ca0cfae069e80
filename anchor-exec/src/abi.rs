//! Contract bindings for the stablecoin token and the collateral engine.

use alloy_sol_types::sol;

sol! {
    /// ERC-20 surface used by the client.
    interface IERC20 {
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }

    /// Collateral engine entry points.
    interface IAnchorEngine {
        function depositCollateral(address tokenCollateralAddress, uint256 amountCollateral) external;
        function mintAUSD(uint256 amountAUSDToMint) external;
        function burnAUSD(uint256 amount) external;
        function redeemCollateral(address tokenCollateralAddress, uint256 amountCollateral) external;
        function redeemCollateralForAUSD(
            address tokenCollateralAddress,
            uint256 amountCollateral,
            uint256 amountAUSDToBurn
        ) external;
        function liquidate(address collateral, address user, uint256 debtToCover) external;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};
    use alloy_sol_types::SolCall;

    #[test]
    fn test_erc20_selectors() {
        assert_eq!(IERC20::approveCall::SELECTOR, [0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(IERC20::allowanceCall::SELECTOR, [0xdd, 0x62, 0xed, 0x3e]);
    }

    #[test]
    fn test_engine_calldata_layout() {
        let call = IAnchorEngine::depositCollateralCall {
            tokenCollateralAddress: Address::repeat_byte(0x11),
            amountCollateral: U256::from(2u64),
        };
        let data = call.abi_encode();

        // selector + two 32-byte words
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(&data[..4], IAnchorEngine::depositCollateralCall::SELECTOR.as_slice());
        assert_eq!(data[4 + 31], 0x11);
        assert_eq!(data[4 + 63], 2);
    }
}
