use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::{Decode, Encode, Result};

/// A property from the game profile, as carried by `LoginSuccess` and the
/// player-info list. On the wire the signature is prefixed with a presence
/// boolean; in the Mojang session JSON it is simply absent.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// The property name carrying the base64 skin blob.
pub const TEXTURES_PROPERTY: &str = "textures";

impl Property {
    pub fn textures(value: String, signature: Option<String>) -> Self {
        Self {
            name: TEXTURES_PROPERTY.to_owned(),
            value,
            signature,
        }
    }

    pub fn is_textures(&self) -> bool {
        self.name == TEXTURES_PROPERTY
    }
}

impl Encode for Property {
    fn encode(&self, mut w: impl Write) -> Result<()> {
        self.name.encode(&mut w)?;
        self.value.encode(&mut w)?;
        self.signature.encode(w)
    }
}

impl Decode<'_> for Property {
    fn decode(r: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            name: String::decode(r)?,
            value: String::decode(r)?,
            signature: Option::<String>::decode(r)?,
        })
    }
}
