// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Authentication against a freshly connected handle.

use std::sync::Arc;

use russh::client::Handle;

use super::handler::ClientHandler;
use crate::shared::error::TransportError;
use crate::target::AuthMethod;

pub(super) async fn authenticate(
    handle: &mut Handle<ClientHandler>,
    username: &str,
    auth: &AuthMethod,
) -> Result<(), TransportError> {
    let authenticated = match auth {
        AuthMethod::Password(password) => handle
            .authenticate_password(username, password.as_str())
            .await?
            .success(),
        AuthMethod::KeyFile(path) => {
            let key_path = crate::config::expand_tilde(path);
            let private_key = russh::keys::load_secret_key(&key_path, None)?;
            let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
            handle
                .authenticate_publickey(
                    username,
                    russh::keys::PrivateKeyWithHashAlg::new(Arc::new(private_key), hash_alg),
                )
                .await?
                .success()
        }
    };

    if authenticated {
        Ok(())
    } else {
        Err(TransportError::AuthenticationFailed(format!(
            "{username} ({} auth)",
            auth.kind()
        )))
    }
}
