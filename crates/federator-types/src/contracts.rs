// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![allow(clippy::too_many_arguments)]

use ethers::contract::abigen;

abigen!(
    BridgeContract,
    r#"[
        event Cross(address indexed tokenAddress, address indexed from, address indexed to, uint256 amount, bytes userData)
        function acceptTransfer(address originalTokenAddress, address sender, address receiver, uint256 amount, bytes32 blockHash, bytes32 transactionHash, uint32 logIndex) returns (bool)
    ]"#;

    FederationContract,
    r#"[
        function voteTransaction(address originalTokenAddress, address sender, address receiver, uint256 amount, bytes32 blockHash, bytes32 transactionHash, uint32 logIndex) returns (bool)
        function getTransactionId(address originalTokenAddress, address sender, address receiver, uint256 amount, bytes32 blockHash, bytes32 transactionHash, uint32 logIndex) view returns (bytes32)
        function hasVoted(bytes32 transactionId) view returns (bool)
        function transactionWasProcessed(bytes32 transactionId) view returns (bool)
    ]"#;

    MultiSigWalletContract,
    r#"[
        function submitTransaction(address destination, uint256 value, bytes data) returns (uint256)
        function confirmTransaction(uint256 transactionId)
        function transactionCount() view returns (uint256)
        function transactions(uint256 transactionId) view returns (address destination, uint256 value, bytes data, bool executed)
        function confirmations(uint256 transactionId, address owner) view returns (bool)
        function isConfirmed(uint256 transactionId) view returns (bool)
    ]"#;
);
