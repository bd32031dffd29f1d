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

//! Generate a validator's committee key: an incognito (payment) keypair and a
//! mining keypair. Secrets go to the data dir, the key string to stdout.

use anyhow::{Context, Result};
use ring::signature::{Ed25519KeyPair, KeyPair};
use shardbeacon::core::types::CommitteePublicKey;
use std::path::{Path, PathBuf};

fn write_secret(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    Ok(())
}

fn generate(rng: &ring::rand::SystemRandom, path: &Path) -> Result<Vec<u8>> {
    let pkcs8 = Ed25519KeyPair::generate_pkcs8(rng)?;
    write_secret(path, pkcs8.as_ref())?;
    let kp = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref())?;
    Ok(kp.public_key().as_ref().to_vec())
}

fn main() -> Result<()> {
    let out_dir = std::env::args().nth(1).unwrap_or_else(|| "data".to_string());
    let dir = PathBuf::from(out_dir);
    std::fs::create_dir_all(&dir)?;

    let rng = ring::rand::SystemRandom::new();
    let inc = generate(&rng, &dir.join("incognito.key"))?;
    let mining = generate(&rng, &dir.join("mining.key"))?;

    let key = CommitteePublicKey::new(inc, mining)?.to_key_string();
    std::fs::write(dir.join("committee.key"), &key)?;
    println!("{key}");
    Ok(())
}
