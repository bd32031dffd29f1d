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
use shardbeacon::core::instruction::{DecodeOptions, Instruction};

#[derive(Clone, Debug, Arbitrary)]
struct Input {
    fields: Vec<String>,
    strict: bool,
}

fuzz_target!(|inp: Input| {
    let opts = DecodeOptions {
        strict_stake_field_counts: inp.strict,
    };
    if let Ok(inst) = Instruction::decode(&inp.fields, opts) {
        // accepted input re-encodes to a form that decodes to the same value
        let again = Instruction::decode(&inst.encode(), opts).ok();
        assert_eq!(again, Some(inst));
    }
});
