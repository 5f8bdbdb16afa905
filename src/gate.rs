//! Re-keying query results for individual clients.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing::{debug, info, warn};

use crate::bfv::keygen::{gen_public_key_with_rng, gen_secret_key_with_rng};
use crate::bfv::{self, BatchEncoder, Ciphertext, KeySwitchKey, PublicKey, SecretKey};
use crate::context::{sum_slots, CryptoContext};
use crate::error::{CohortError, Result};
use crate::params::BfvParams;
use crate::query::types::Squashed;

pub type ClientId = String;

/// Owner-side cache of key-switching keys, one per registered client.
///
/// Keys are derived once from the client's public key and reused for every
/// result returned to that client.
pub struct KeySwitchGate {
    ctx: Arc<CryptoContext>,
    keys: RwLock<HashMap<ClientId, Arc<KeySwitchKey>>>,
}

impl KeySwitchGate {
    pub fn new(ctx: Arc<CryptoContext>) -> Self {
        Self { ctx, keys: RwLock::new(HashMap::new()) }
    }

    /// Derive and cache the key for `client`. A client that is already
    /// registered keeps its existing key.
    pub fn register(&self, client: impl Into<ClientId>, client_pk: &PublicKey) -> Result<()> {
        let mut rng = ChaCha20Rng::from_os_rng();
        self.register_with_rng(client, client_pk, &mut rng)
    }

    pub fn register_with_rng<R: rand::Rng>(
        &self,
        client: impl Into<ClientId>,
        client_pk: &PublicKey,
        rng: &mut R,
    ) -> Result<()> {
        let client = client.into();
        if self.is_registered(&client) {
            debug!(client = %client, "client already registered");
            return Ok(());
        }
        let key = KeySwitchKey::generate(client_pk, self.ctx.secret_key(), rng)?;
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(client.clone())
            .or_insert_with(|| Arc::new(key));
        info!(client = %client, "registered key-switching key");
        Ok(())
    }

    pub fn is_registered(&self, client: &str) -> bool {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).contains_key(client)
    }

    /// Forget a client's key; returns whether one was registered.
    pub fn revoke(&self, client: &str) -> bool {
        let removed = self.keys.write().unwrap_or_else(PoisonError::into_inner).remove(client);
        if removed.is_some() {
            info!(client, "revoked key-switching key");
        }
        removed.is_some()
    }

    fn key_for(&self, client: &str) -> Result<Arc<KeySwitchKey>> {
        let key = self.keys.read().unwrap_or_else(PoisonError::into_inner).get(client).cloned();
        key.ok_or_else(|| {
            warn!(client, "no key-switching key");
            CohortError::Unauthorized(client.to_string())
        })
    }

    /// Re-key an owner ciphertext so that only `client` can decrypt it.
    pub fn apply(&self, client: &str, ct: &Ciphertext) -> Result<Ciphertext> {
        let key = self.key_for(client)?;
        let switched = key.apply(ct)?;
        debug!(client, remaining = switched.remaining_budget(), "switched ciphertext");
        Ok(switched)
    }

    pub fn apply_squashed(&self, client: &str, squashed: &Squashed) -> Result<Squashed> {
        Ok(Squashed { ciphertext: self.apply(client, &squashed.ciphertext)?, stride: squashed.stride })
    }
}

/// A querying client's own key pair.
pub struct ClientKeys {
    secret_key: SecretKey,
    public_key: PublicKey,
    encoder: BatchEncoder,
}

impl ClientKeys {
    pub fn generate(params: &Arc<BfvParams>) -> Result<Self> {
        let mut rng = ChaCha20Rng::from_os_rng();
        Self::with_rng(params, &mut rng)
    }

    pub fn with_rng<R: rand::Rng>(params: &Arc<BfvParams>, rng: &mut R) -> Result<Self> {
        let secret_key = gen_secret_key_with_rng(params, rng)?;
        let public_key = gen_public_key_with_rng(&secret_key, rng)?;
        let encoder = BatchEncoder::new(params)?;
        Ok(Self { secret_key, public_key, encoder })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn decrypt(&self, ct: &Ciphertext) -> Result<Vec<u64>> {
        Ok(self.encoder.decode(&bfv::decrypt(ct, &self.secret_key)?))
    }

    pub fn decrypt_squashed(&self, squashed: &Squashed) -> Result<u64> {
        let slots = self.decrypt(&squashed.ciphertext)?;
        sum_slots(&slots, 0, squashed.stride, self.encoder.params().plain_modulus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::presets::toy;

    fn setup(seed: u64) -> (Arc<CryptoContext>, ChaCha20Rng) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let ctx = Arc::new(CryptoContext::with_rng(&toy().unwrap(), &mut rng).unwrap());
        (ctx, rng)
    }

    #[test]
    fn test_switch_round_trip() {
        let (ctx, mut rng) = setup(101);
        let alice = ClientKeys::with_rng(ctx.params(), &mut rng).unwrap();
        let mallory = ClientKeys::with_rng(ctx.params(), &mut rng).unwrap();
        let gate = KeySwitchGate::new(ctx.clone());
        gate.register_with_rng("alice", alice.public_key(), &mut rng).unwrap();

        let values = vec![5, 0, 17, 65536, 2, 2, 9, 1];
        let ct = ctx.encrypt(&values).unwrap();
        let switched = gate.apply("alice", &ct).unwrap();
        assert_eq!(alice.decrypt(&switched).unwrap(), values);
        assert_ne!(mallory.decrypt(&switched).unwrap(), values);
        assert_ne!(ctx.decrypt(&switched).unwrap(), values);
    }

    #[test]
    fn test_unregistered_client_is_unauthorized() {
        let (ctx, mut rng) = setup(102);
        let bob = ClientKeys::with_rng(ctx.params(), &mut rng).unwrap();
        let gate = KeySwitchGate::new(ctx.clone());
        let ct = ctx.encrypt(&[1]).unwrap();
        assert!(matches!(gate.apply("bob", &ct), Err(CohortError::Unauthorized(_))));

        gate.register_with_rng("bob", bob.public_key(), &mut rng).unwrap();
        assert!(gate.is_registered("bob"));
        assert!(gate.revoke("bob"));
        assert!(!gate.revoke("bob"));
        assert!(matches!(gate.apply("bob", &ct), Err(CohortError::Unauthorized(_))));
    }

    #[test]
    fn test_register_is_idempotent() {
        let (ctx, mut rng) = setup(103);
        let carol = ClientKeys::with_rng(ctx.params(), &mut rng).unwrap();
        let other = ClientKeys::with_rng(ctx.params(), &mut rng).unwrap();
        let gate = KeySwitchGate::new(ctx.clone());
        gate.register_with_rng("carol", carol.public_key(), &mut rng).unwrap();
        // a second registration does not replace the cached key
        gate.register_with_rng("carol", other.public_key(), &mut rng).unwrap();

        let sq = Squashed { ciphertext: ctx.encrypt(&[3, 4]).unwrap(), stride: 2 };
        let switched = gate.apply_squashed("carol", &sq).unwrap();
        assert_eq!(carol.decrypt_squashed(&switched).unwrap(), 7);
    }
}
