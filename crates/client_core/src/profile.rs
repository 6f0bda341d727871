use std::{collections::BTreeSet, fmt};

use shared::protocol::UserRecord;

/// Contact and address fields a user must fill in before shipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProfileField {
    Phone,
    Street,
    City,
    State,
    Zip,
    Country,
}

impl ProfileField {
    pub const ALL: [ProfileField; 6] = [
        ProfileField::Phone,
        ProfileField::Street,
        ProfileField::City,
        ProfileField::State,
        ProfileField::Zip,
        ProfileField::Country,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ProfileField::Phone => "phone",
            ProfileField::Street => "street",
            ProfileField::City => "city",
            ProfileField::State => "state",
            ProfileField::Zip => "zip",
            ProfileField::Country => "country",
        }
    }

    fn value(self, user: &UserRecord) -> Option<&str> {
        match self {
            ProfileField::Phone => user.phone_number.as_deref(),
            ProfileField::Street => user.street.as_deref(),
            ProfileField::City => user.city.as_deref(),
            ProfileField::State => user.state.as_deref(),
            ProfileField::Zip => user.zip_code.as_deref(),
            ProfileField::Country => user.country.as_deref(),
        }
    }
}

impl fmt::Display for ProfileField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Blank strings count as missing.
pub fn missing_profile_fields(user: &UserRecord) -> BTreeSet<ProfileField> {
    ProfileField::ALL
        .into_iter()
        .filter(|field| field.value(user).map_or(true, |v| v.trim().is_empty()))
        .collect()
}

pub fn is_profile_complete(user: &UserRecord) -> bool {
    missing_profile_fields(user).is_empty()
}

#[cfg(test)]
mod tests {
    use shared::domain::UserId;

    use super::*;

    fn user() -> UserRecord {
        UserRecord {
            id: UserId(1),
            first_name: "Amina".into(),
            last_name: "Odhiambo".into(),
            email: Some("amina@example.com".into()),
            phone_number: Some("+254700000000".into()),
            street: Some("Moi Avenue".into()),
            city: Some("Nairobi".into()),
            state: Some("Nairobi County".into()),
            zip_code: Some("00100".into()),
            country: Some("Kenya".into()),
            roles: vec!["user".into()],
        }
    }

    #[test]
    fn full_profile_has_nothing_missing() {
        assert!(missing_profile_fields(&user()).is_empty());
        assert!(is_profile_complete(&user()));
    }

    #[test]
    fn absent_and_blank_fields_are_reported() {
        let mut incomplete = user();
        incomplete.phone_number = None;
        incomplete.zip_code = Some("   ".into());

        let missing = missing_profile_fields(&incomplete);
        assert_eq!(
            missing.into_iter().collect::<Vec<_>>(),
            vec![ProfileField::Phone, ProfileField::Zip]
        );
        assert!(!is_profile_complete(&incomplete));
    }
}
