// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]

use shardbeacon::core::state::merkle::verify_proof;
use shardbeacon::core::state::stake_store::{StakeInfo, StakeInfoReader, StakeInfoWriter, StakeStore};

fn info(k: &str, tx: &str) -> StakeInfo {
    StakeInfo {
        committee_key: k.to_string(),
        tx_stake: tx.to_string(),
        reward_receiver: "receiver".to_string(),
        auto_stake: true,
        beacon_height: 3,
    }
}

#[test]
fn test_stake_root_and_proof() {
    let dir = tempfile::tempdir().unwrap();
    let st = StakeStore::open(dir.path().to_str().unwrap()).unwrap();

    st.put_all(&[info("a", "tx-a"), info("b", "tx-b"), info("c", "tx-c")])
        .unwrap();

    let root = st.root().unwrap();
    let (got, root2, proof) = st.prove("b").unwrap().unwrap();
    assert_eq!(got.tx_stake, "tx-b");
    assert_eq!(root, root2);
    assert!(verify_proof(&root, &proof));
    assert!(st.prove("zz").unwrap().is_none());
}

#[test]
fn test_records_survive_reopen_and_delete_changes_root() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_str().unwrap().to_string();
    let before = {
        let st = StakeStore::open(&path).unwrap();
        st.put_all(&[info("a", "tx-a"), info("b", "tx-b")]).unwrap();
        st.root().unwrap()
    };

    let st = StakeStore::open(&path).unwrap();
    assert_eq!(st.root().unwrap(), before);
    assert_eq!(st.stake_info("a").unwrap().unwrap().tx_stake, "tx-a");

    st.delete_all(&["a".to_string()]).unwrap();
    assert!(st.stake_info("a").unwrap().is_none());
    assert_ne!(st.root().unwrap(), before);
}
