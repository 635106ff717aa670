//! Fixed-width row encoding (spec §3): `{id: u32, username: [u8;32],
//! email: [u8;255]}`, NUL-padded in place — no length prefixes, no bincode
//! framing, because the node codec addresses cells by a constant stride.
//!
//! The stored field widths are one byte wider than the content bound
//! (`USERNAME_SIZE`/`EMAIL_SIZE`) to leave room for the NUL terminator
//! `read_padded` scans for, matching `original_source/main.c`'s
//! `char username[COLUMN_USERNAME_SIZE + 1]` — a 32-byte username is valid
//! content and needs a 33rd byte to hold its terminator.
use crate::errors::Error;

pub const USERNAME_SIZE: usize = 32;
pub const EMAIL_SIZE: usize = 255;
pub const ID_SIZE: usize = 4;
const USERNAME_FIELD_SIZE: usize = USERNAME_SIZE + 1;
const EMAIL_FIELD_SIZE: usize = EMAIL_SIZE + 1;
pub const ROW_SIZE: usize = ID_SIZE + USERNAME_FIELD_SIZE + EMAIL_FIELD_SIZE;

const USERNAME_OFFSET: usize = ID_SIZE;
const EMAIL_OFFSET: usize = USERNAME_OFFSET + USERNAME_FIELD_SIZE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: u32,
    pub username: String,
    pub email: String,
}

impl Row {
    pub fn new(id: u32, username: impl Into<String>, email: impl Into<String>) -> Result<Self, Error> {
        let row = Row {
            id,
            username: username.into(),
            email: email.into(),
        };
        row.validate()?;
        Ok(row)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.id == 0 {
            return Err(Error::NegativeId);
        }
        if self.username.as_bytes().len() > USERNAME_SIZE {
            return Err(Error::StringTooLong);
        }
        if self.email.as_bytes().len() > EMAIL_SIZE {
            return Err(Error::StringTooLong);
        }
        Ok(())
    }

    /// Serialize into a caller-owned `ROW_SIZE` buffer, as stored verbatim
    /// in a leaf cell's value slot.
    pub fn serialize(&self) -> [u8; ROW_SIZE] {
        let mut buf = [0u8; ROW_SIZE];
        buf[0..ID_SIZE].copy_from_slice(&self.id.to_le_bytes());
        write_padded(&mut buf[USERNAME_OFFSET..USERNAME_OFFSET + USERNAME_FIELD_SIZE], &self.username);
        write_padded(&mut buf[EMAIL_OFFSET..EMAIL_OFFSET + EMAIL_FIELD_SIZE], &self.email);
        buf
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() != ROW_SIZE {
            return Err(Error::CorruptFile(format!(
                "row buffer is {} bytes, expected {ROW_SIZE}",
                buf.len()
            )));
        }
        let id = u32::from_le_bytes(buf[0..ID_SIZE].try_into().unwrap());
        let username = read_padded(&buf[USERNAME_OFFSET..USERNAME_OFFSET + USERNAME_FIELD_SIZE])?;
        let email = read_padded(&buf[EMAIL_OFFSET..EMAIL_OFFSET + EMAIL_FIELD_SIZE])?;
        Ok(Row { id, username, email })
    }
}

fn write_padded(dest: &mut [u8], s: &str) {
    let bytes = s.as_bytes();
    dest[..bytes.len()].copy_from_slice(bytes);
    for b in &mut dest[bytes.len()..] {
        *b = 0;
    }
}

fn read_padded(src: &[u8]) -> Result<String, Error> {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    std::str::from_utf8(&src[..end])
        .map(|s| s.to_string())
        .map_err(|_| Error::CorruptFile("non-utf8 bytes in fixed string field".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_serialize_deserialize() {
        let row = Row::new(1, "alice", "alice@example.com").unwrap();
        let buf = row.serialize();
        assert_eq!(buf.len(), ROW_SIZE);
        let back = Row::deserialize(&buf).unwrap();
        assert_eq!(row, back);
    }

    #[test]
    fn rejects_zero_id() {
        assert!(matches!(Row::new(0, "a", "b"), Err(Error::NegativeId)));
    }

    #[test]
    fn full_width_username_and_email_are_accepted() {
        let username = "x".repeat(USERNAME_SIZE);
        let email = "y".repeat(EMAIL_SIZE);
        let row = Row::new(1, username.clone(), email.clone()).unwrap();
        let buf = row.serialize();
        let back = Row::deserialize(&buf).unwrap();
        assert_eq!(back.username, username);
        assert_eq!(back.email, email);
    }

    #[test]
    fn rejects_oversized_username() {
        let long = "x".repeat(USERNAME_SIZE + 1);
        assert!(matches!(
            Row::new(1, long, "b"),
            Err(Error::StringTooLong)
        ));
    }

    #[test]
    fn rejects_oversized_email() {
        let long = "x".repeat(EMAIL_SIZE + 1);
        assert!(matches!(
            Row::new(1, "a", long),
            Err(Error::StringTooLong)
        ));
    }

    #[test]
    fn row_size_matches_fixed_width_invariant() {
        assert_eq!(ROW_SIZE, 293);
    }
}
