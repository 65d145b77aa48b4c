use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub String);

impl CustomerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A customer record. Once resolved against a case's sender it serves as the
/// case's verified identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(rename = "user_id")]
    pub id: CustomerId,
    pub email: String,
    pub name: String,
}

impl Customer {
    pub fn owns_address(&self, address: &str) -> bool {
        self.email.trim().eq_ignore_ascii_case(address.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::{Customer, CustomerId};

    #[test]
    fn address_match_ignores_case_and_whitespace() {
        let customer = Customer {
            id: CustomerId("usr_001".to_owned()),
            email: "john.doe@email.com".to_owned(),
            name: "John Doe".to_owned(),
        };

        assert!(customer.owns_address(" JOHN.DOE@email.com"));
        assert!(!customer.owns_address("jane.smith@email.com"));
    }

    #[test]
    fn serializes_id_as_user_id() {
        let customer = Customer {
            id: CustomerId("usr_002".to_owned()),
            email: "jane.smith@email.com".to_owned(),
            name: "Jane Smith".to_owned(),
        };

        let json = serde_json::to_value(&customer).expect("serialize customer");
        assert_eq!(json["user_id"], "usr_002");
    }
}
