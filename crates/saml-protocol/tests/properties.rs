//! Property tests for the artifact codec and name ID rules.

use proptest::prelude::*;
use saml_protocol::artifact::{self, FIELD_LEN};
use saml_protocol::validation::NameIdValidator;
use saml_protocol::{NameId, NameIdFormat};

proptest! {
    #[test]
    fn artifact_fields_survive_encoding(
        type_code in any::<i16>(),
        endpoint_index in any::<i16>(),
        source in prop::array::uniform20(any::<u8>()),
        handle in prop::array::uniform20(any::<u8>()),
    ) {
        let encoded = artifact::encode(type_code, endpoint_index, &source, &handle).unwrap();
        prop_assert_eq!(
            artifact::decode(&encoded).unwrap(),
            (type_code, endpoint_index, source, handle)
        );
    }

    #[test]
    fn lenient_decoding_never_fails_loudly(input in ".{0,80}") {
        let strict = artifact::decode(&input).ok();
        prop_assert_eq!(artifact::try_decode(&input), strict);
    }

    #[test]
    fn wrong_buffer_lengths_are_rejected(len in 0usize..64) {
        prop_assume!(len != FIELD_LEN);
        let short = vec![0u8; len];
        let fine = [0u8; FIELD_LEN];
        prop_assert!(artifact::encode(4, 0, &short, &fine).is_err());
        prop_assert!(artifact::encode(4, 0, &fine, &short).is_err());
    }

    #[test]
    fn whitespace_only_names_are_rejected(value in "[ \t\r\n]{0,12}") {
        for format in [
            NameIdFormat::Email,
            NameIdFormat::X509SubjectName,
            NameIdFormat::Windows,
            NameIdFormat::Kerberos,
            NameIdFormat::Entity,
            NameIdFormat::Persistent,
        ] {
            let name_id = NameId::with_format(value.clone(), format);
            prop_assert!(NameIdValidator.validate(&name_id).is_err());
        }
        let unspecified = NameId::with_format(value, NameIdFormat::Unspecified);
        prop_assert!(NameIdValidator.validate(&unspecified).is_ok());
    }
}
