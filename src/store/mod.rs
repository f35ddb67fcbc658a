pub mod crypto;
pub mod face_cache;
pub mod ledger;
pub mod secure_store;

pub use crypto::{DeviceCipher, DeviceKeyFile, KdfParams, PayloadCipher};
pub use face_cache::FaceReferenceCache;
pub use ledger::DayLedger;
pub use secure_store::SecureStore;
