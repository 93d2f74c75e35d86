use crate::error::Error;
use crate::voting::{Signature, VoterId};

/// External signing and verification oracle for a keyed voter identity.
///
/// The gadget never implements cryptography itself; a node wires in its
/// keystore here. `sign` fails for identities the oracle holds no key for.
pub trait SignatureOracle {
	fn sign(&self, payload: &[u8], voter: &VoterId) -> Result<Signature, Error>;

	fn verify(&self, payload: &[u8], signature: &Signature, voter: &VoterId) -> bool;
}

impl<T: SignatureOracle + ?Sized> SignatureOracle for &T {
	fn sign(&self, payload: &[u8], voter: &VoterId) -> Result<Signature, Error> {
		(**self).sign(payload, voter)
	}

	fn verify(&self, payload: &[u8], signature: &Signature, voter: &VoterId) -> bool {
		(**self).verify(payload, signature, voter)
	}
}
