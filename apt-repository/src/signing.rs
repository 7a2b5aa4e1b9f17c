// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! PGP signing of repository manifests.

APT verifies a distribution through the signature over its `Release`
file, expressed two ways: a detached ASCII armored signature stored
next to the manifest as `Release.gpg` and a cleartext inline signature
stored as `InRelease`. [SigningKey] wraps a PGP secret key and
produces both.
*/

use {
    crate::error::{RepoError, Result},
    chrono::SubsecRound,
    pgp::{
        crypto::HashAlgorithm,
        packet::{Packet, SignatureConfig, SignatureType, Subpacket},
        types::{KeyTrait, KeyVersion, SecretKeyTrait},
        Deserializable, SignedSecretKey,
    },
    smallvec::SmallVec,
    std::io::Cursor,
};

/// A PGP secret key used to sign `Release` manifests.
#[derive(Debug)]
pub struct SigningKey {
    key: SignedSecretKey,
}

impl SigningKey {
    /// Parse an ASCII armored PGP secret key.
    ///
    /// If the armored input holds multiple keys, only the first is
    /// used.
    pub fn from_armored(data: &[u8]) -> Result<Self> {
        let (key, _headers) = SignedSecretKey::from_armor_single(Cursor::new(data))
            .map_err(RepoError::SigningKey)?;

        Ok(Self { key })
    }

    pub fn from_key(key: SignedSecretKey) -> Self {
        Self { key }
    }

    /// Produce a detached ASCII armored signature over raw content.
    ///
    /// This is the `Release.gpg` flavor of manifest signature.
    pub fn detached_signature(&self, data: &[u8]) -> Result<String> {
        let hashed_subpackets = vec![
            Subpacket::IssuerFingerprint(
                KeyVersion::V4,
                SmallVec::from_slice(&self.key.fingerprint()),
            ),
            Subpacket::SignatureCreationTime(chrono::Utc::now().trunc_subsecs(0)),
        ];
        let unhashed_subpackets = vec![Subpacket::Issuer(self.key.key_id())];

        let config = SignatureConfig::new_v4(
            Default::default(),
            SignatureType::Binary,
            self.key.algorithm(),
            HashAlgorithm::SHA2_256,
            hashed_subpackets,
            unhashed_subpackets,
        );

        let signature = config
            .sign(&self.key, String::new, Cursor::new(data.to_vec()))
            .map_err(RepoError::SigningKey)?;

        let packet = Packet::Signature(signature);
        let mut writer = Cursor::new(Vec::<u8>::new());
        pgp::armor::write(&packet, pgp::armor::BlockType::Signature, &mut writer, None)
            .map_err(RepoError::SigningKey)?;

        String::from_utf8(writer.into_inner())
            .map_err(|e| RepoError::SigningKey(pgp::errors::Error::Utf8Error(e.utf8_error())))
    }

    /// Produce a cleartext framed signature embedding the content.
    ///
    /// This is the `InRelease` flavor of manifest signature.
    pub fn inline_signature(&self, text: &str) -> Result<String> {
        pgp_cleartext::cleartext_sign(
            &self.key,
            String::new,
            HashAlgorithm::SHA2_256,
            Cursor::new(text.as_bytes().to_vec()),
        )
        .map_err(RepoError::SigningKey)
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use {
        super::*,
        pgp::{
            crypto::SymmetricKeyAlgorithm, types::CompressionAlgorithm, KeyType,
            SecretKeyParamsBuilder, SignedPublicKey,
        },
        smallvec::smallvec,
    };

    /// Generate a throwaway self-signed signing key pair.
    pub(crate) fn test_key() -> (SignedSecretKey, SignedPublicKey) {
        let mut key_params = SecretKeyParamsBuilder::default();
        key_params
            .key_type(KeyType::Rsa(2048))
            .preferred_symmetric_algorithms(smallvec![SymmetricKeyAlgorithm::AES256])
            .preferred_compression_algorithms(smallvec![CompressionAlgorithm::ZLIB])
            .preferred_hash_algorithms(smallvec![
                HashAlgorithm::SHA2_256,
                HashAlgorithm::SHA2_384,
                HashAlgorithm::SHA2_512
            ])
            .can_create_certificates(false)
            .can_sign(true)
            .primary_user_id("Tester <tester@example.com>".to_string());

        let secret_key = key_params.build().unwrap().generate().unwrap();
        let secret_key_signed = secret_key.sign(String::new).unwrap();

        let public_key = secret_key_signed.public_key();
        let public_key_signed = public_key.sign(&secret_key_signed, String::new).unwrap();

        (secret_key_signed, public_key_signed)
    }
}

#[cfg(test)]
mod test {
    use {super::*, pgp_cleartext::CleartextSignatureReader, std::io::Read};

    #[test]
    fn armored_round_trip() {
        let (secret, _) = testutil::test_key();
        let armored = secret.to_armored_string(None).unwrap();

        let key = SigningKey::from_armored(armored.as_bytes()).unwrap();
        let signature = key.detached_signature(b"hello world").unwrap();
        assert!(signature.starts_with("-----BEGIN PGP SIGNATURE-----"));
    }

    #[test]
    fn from_armored_rejects_garbage() {
        assert!(matches!(
            SigningKey::from_armored(b"not a key").unwrap_err(),
            RepoError::SigningKey(_)
        ));
    }

    #[test]
    fn inline_signature_verifies() {
        let (secret, public) = testutil::test_key();
        let key = SigningKey::from_key(secret);

        let manifest = "Origin: Test\nSuite: focal\n";
        let inline = key.inline_signature(manifest).unwrap();

        assert!(inline.starts_with("-----BEGIN PGP SIGNED MESSAGE-----"));
        assert!(inline.contains("Suite: focal"));
        assert!(inline.trim_end().ends_with("-----END PGP SIGNATURE-----"));

        let mut reader = CleartextSignatureReader::new(Cursor::new(inline.into_bytes()));
        let mut cleartext = Vec::new();
        reader.read_to_end(&mut cleartext).unwrap();
        assert_eq!(
            String::from_utf8(cleartext).unwrap().trim_end(),
            manifest.trim_end()
        );

        let signatures = reader.finalize();
        assert_eq!(signatures.verify(&public).unwrap(), 1);
    }
}
