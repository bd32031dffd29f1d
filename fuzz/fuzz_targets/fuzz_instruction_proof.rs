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

#![no_main]
#![forbid(unsafe_code)]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use shardbeacon::core::state::roots::{instruction_merkle_root, instruction_proof, verify_instruction};

#[derive(Clone, Debug, Arbitrary)]
struct Input {
    insts: Vec<Vec<String>>,
    index: u16,
}

fuzz_target!(|inp: Input| {
    let root = instruction_merkle_root(&inp.insts);
    if inp.insts.is_empty() { return; }
    let idx = (inp.index as usize) % inp.insts.len();

    if let Some(p) = instruction_proof(&inp.insts, idx) {
        assert!(verify_instruction(&root, &inp.insts[idx], &p));
    }
});
