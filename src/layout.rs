// 🧱 Layout Resolver - Bank layout templates → concrete EEPROM fields
// Bank addresses come from family base + per-category offset, never from flash size.

use crate::error::{Error, Result};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ADDRESS
// ============================================================================

/// Absolute address or offset, rendered as `0x08080C00`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub u32);

impl Address {
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Offset this address, failing on overflow past 4 GiB
    pub fn checked_add(&self, offset: Address) -> Option<Address> {
        self.0.checked_add(offset.0).map(Address)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let parsed = match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some(hex) => u32::from_str_radix(hex, 16),
            None => trimmed.parse::<u32>(),
        };
        parsed
            .map(Address)
            .map_err(|e| Error::invalid_rules(format!("bad address '{}': {}", s, e)))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct AddressVisitor;

        impl<'de> Visitor<'de> for AddressVisitor {
            type Value = Address;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a hex string like \"0x08080000\" or an integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Address, E> {
                v.parse::<Address>().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Address, E> {
                u32::try_from(v)
                    .map(Address)
                    .map_err(|_| E::custom(format!("address {} exceeds 32 bits", v)))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Address, E> {
                u32::try_from(v)
                    .map(Address)
                    .map_err(|_| E::custom(format!("address {} out of range", v)))
            }
        }

        deserializer.deserialize_any(AddressVisitor)
    }
}

// ============================================================================
// TEMPLATE
// ============================================================================

/// One bank of a template: offset from the family EEPROM base and size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankSpec {
    pub offset: Address,
    pub size: u32,
}

/// Expected EEPROM layout of a category
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BankLayoutTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank1: Option<BankSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank2: Option<BankSpec>,
}

impl BankLayoutTemplate {
    pub fn single(size: u32) -> Self {
        BankLayoutTemplate {
            bank1: Some(BankSpec {
                offset: Address(0),
                size,
            }),
            bank2: None,
        }
    }

    pub fn bank2_only(offset: u32, size: u32) -> Self {
        BankLayoutTemplate {
            bank1: None,
            bank2: Some(BankSpec {
                offset: Address(offset),
                size,
            }),
        }
    }

    pub fn dual(bank_size: u32, bank2_offset: u32) -> Self {
        BankLayoutTemplate {
            bank1: Some(BankSpec {
                offset: Address(0),
                size: bank_size,
            }),
            bank2: Some(BankSpec {
                offset: Address(bank2_offset),
                size: bank_size,
            }),
        }
    }

    /// Documented total: sum of present bank sizes, `None` past 32 bits
    pub fn total_size(&self) -> Option<u32> {
        let b1 = self.bank1.map(|b| b.size).unwrap_or(0);
        let b2 = self.bank2.map(|b| b.size).unwrap_or(0);
        b1.checked_add(b2)
    }

    pub fn bank_count(&self) -> usize {
        self.bank1.is_some() as usize + self.bank2.is_some() as usize
    }

    /// Check the template is a usable category layout
    pub fn validate(&self) -> Result<()> {
        if self.bank_count() == 0 {
            return Err(Error::invalid_rules("template defines no EEPROM bank"));
        }

        for (name, bank) in [("bank1", self.bank1), ("bank2", self.bank2)] {
            if let Some(bank) = bank {
                if bank.size == 0 {
                    return Err(Error::invalid_rules(format!("{} has zero size", name)));
                }
            }
        }

        if self.total_size().is_none() {
            return Err(Error::invalid_rules("bank sizes overflow 32 bits"));
        }

        if let (Some(b1), Some(b2)) = (self.bank1, self.bank2) {
            let b1_end = b1.offset.value() as u64 + b1.size as u64;
            if b1_end > b2.offset.value() as u64 {
                return Err(Error::invalid_rules(format!(
                    "bank2 at offset {} overlaps bank1 ending at offset 0x{:X}",
                    b2.offset, b1_end
                )));
            }
        }

        Ok(())
    }

    /// Instantiate the template at a family's EEPROM base address
    ///
    /// Example:
    /// ```
    /// use eeprom_reconcile::{Address, BankLayoutTemplate};
    ///
    /// let layout = BankLayoutTemplate::dual(3072, 0x0C00).resolve(Address(0x0808_0000)).unwrap();
    /// assert_eq!(layout.bank2_start(), Some(Address(0x0808_0C00)));
    /// assert_eq!(layout.total_size, 6144);
    /// ```
    pub fn resolve(&self, base: Address) -> Result<ResolvedLayout> {
        let place = |bank: Option<BankSpec>| -> Result<Option<ResolvedBank>> {
            bank.map(|spec| {
                base.checked_add(spec.offset)
                    .map(|start| ResolvedBank {
                        start,
                        size: spec.size,
                    })
                    .ok_or_else(|| {
                        Error::invalid_rules(format!(
                            "bank offset {} overflows base {}",
                            spec.offset, base
                        ))
                    })
            })
            .transpose()
        };

        let total_size = self
            .total_size()
            .ok_or_else(|| Error::invalid_rules("bank sizes overflow 32 bits"))?;

        Ok(ResolvedLayout {
            bank1: place(self.bank1)?,
            bank2: place(self.bank2)?,
            total_size,
        })
    }
}

// ============================================================================
// RESOLVED LAYOUT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedBank {
    pub start: Address,
    pub size: u32,
}

/// Concrete EEPROM fields for one part
///
/// A `None` bank means the category has no such bank. An unknown layout
/// (classification failed) is represented by the absence of a
/// `ResolvedLayout` altogether.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedLayout {
    pub bank1: Option<ResolvedBank>,
    pub bank2: Option<ResolvedBank>,
    pub total_size: u32,
}

impl ResolvedLayout {
    pub fn bank1_start(&self) -> Option<Address> {
        self.bank1.map(|b| b.start)
    }

    pub fn bank1_size(&self) -> Option<u32> {
        self.bank1.map(|b| b.size)
    }

    pub fn bank2_start(&self) -> Option<Address> {
        self.bank2.map(|b| b.start)
    }

    pub fn bank2_size(&self) -> Option<u32> {
        self.bank2.map(|b| b.size)
    }

    /// Sum of present bank sizes; equals `total_size` for every resolved layout
    pub fn bank_sum(&self) -> u64 {
        u64::from(self.bank1_size().unwrap_or(0)) + u64::from(self.bank2_size().unwrap_or(0))
    }
}

// ============================================================================
// TESTS
// ============================================================================
