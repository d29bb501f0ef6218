//! Fractional rank keys for drag-and-reorderable lists.
//!
//! A rank key is an ASCII string over the base-62 alphabet `0-9A-Za-z`.
//! Plain byte-wise string comparison of two keys reproduces the list order,
//! so a moved item only needs one new key between its neighbours and the
//! siblings are never renumbered.
//!
//! Keys have two parts. The integer part starts with a head character that
//! encodes its length (`a`..`z` for 1..26 digits, `A`..`Z` for 26..1
//! digits below zero), which keeps appends at either end short. The
//! fractional part holds the digits used to split two adjacent integers and
//! never ends in `0`.
//!
//! The public functions never fail. Malformed neighbours are dropped and the
//! key is generated as if that side were open.

use thiserror::Error;

const DIGITS: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const ZERO: u8 = b'0';
const LAST_DIGIT: u8 = b'z';

/// The lowest representable integer part; nothing can be placed before it.
const SMALLEST_INTEGER: &str = "A00000000000000000000000000";

/// Key returned when no neighbours are known.
const MIDPOINT_KEY: &str = "a0";

/// Internal failure while generating a key.
///
/// Never returned from the public API: every variant is recovered by falling
/// back to an open bound.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
enum RankError {
    #[error("rank key is empty")]
    Empty,
    #[error("invalid rank digit {0:?}")]
    InvalidDigit(char),
    #[error("invalid rank head {0:?}")]
    InvalidHead(char),
    #[error("rank key {0:?} is malformed")]
    Malformed(String),
    #[error("rank keys out of order: {0:?} >= {1:?}")]
    OutOfOrder(String, String),
    #[error("rank space exhausted")]
    Exhausted,
}

type RankResult<T> = Result<T, RankError>;

/// The key given to the first item of an empty list.
pub fn first_rank() -> String {
    MIDPOINT_KEY.to_string()
}

/// A key ordered right after [`first_rank`].
pub fn last_rank() -> String {
    rank_between(Some(MIDPOINT_KEY), None)
}

/// Whether `key` is a well-formed rank key.
pub fn is_valid_rank(key: &str) -> bool {
    validate_order_key(key).is_ok()
}

/// Generate a key strictly between `left` and `right`.
///
/// - `(None, None)` always returns the same midpoint key.
/// - `(Some(l), None)` returns a key greater than `l`.
/// - `(None, Some(r))` returns a key less than `r`.
/// - Neighbours given in the wrong order are swapped.
/// - Empty or malformed neighbours are treated as absent; when both are
///   unusable the result is [`first_rank`].
pub fn rank_between(left: Option<&str>, right: Option<&str>) -> String {
    let (left, right) = usable_bounds(left, right);

    match key_between(left, right) {
        Ok(key) => key,
        Err(error) => {
            tracing::debug!(?left, ?right, %error, "rank neighbours rejected, widening bounds");
            key_between(None, right)
                .or_else(|_| key_between(left, None))
                .unwrap_or_else(|_| first_rank())
        }
    }
}

/// Generate `count` ascending keys strictly between `left` and `right`.
///
/// Uses the same neighbour rules as [`rank_between`]. Keys are spread so
/// the result stays short when filling an empty range.
pub fn ranks_between(left: Option<&str>, right: Option<&str>, count: usize) -> Vec<String> {
    let (left, right) = usable_bounds(left, right);

    match n_keys_between(left, right, count) {
        Ok(keys) => keys,
        Err(error) => {
            tracing::debug!(?left, ?right, %error, "bulk rank generation failed, appending sequentially");
            let mut keys = Vec::with_capacity(count);
            let mut previous = left.map(str::to_string);
            for _ in 0..count {
                let key = rank_between(previous.as_deref(), None);
                previous = Some(key.clone());
                keys.push(key);
            }
            keys
        }
    }
}

/// Key for an item dropped at `index` of an already ordered sibling list.
///
/// `siblings` are the ranks of the other items in display order, without the
/// item being placed. An index past the end appends.
pub fn rank_for_index(siblings: &[&str], index: usize) -> String {
    let index = index.min(siblings.len());
    let previous = index.checked_sub(1).and_then(|i| siblings.get(i)).copied();
    let next = siblings.get(index).copied();
    rank_between(previous, next)
}

fn usable_bounds<'a>(
    left: Option<&'a str>,
    right: Option<&'a str>,
) -> (Option<&'a str>, Option<&'a str>) {
    let left = left.filter(|key| is_valid_rank(key));
    let right = right.filter(|key| is_valid_rank(key));
    match (left, right) {
        (Some(l), Some(r)) if l > r => (Some(r), Some(l)),
        bounds => bounds,
    }
}

fn digit_index(digit: u8) -> RankResult<usize> {
    DIGITS
        .iter()
        .position(|candidate| *candidate == digit)
        .ok_or(RankError::InvalidDigit(char::from(digit)))
}

fn integer_length(head: u8) -> RankResult<usize> {
    match head {
        b'a'..=b'z' => Ok(usize::from(head - b'a') + 2),
        b'A'..=b'Z' => Ok(usize::from(b'Z' - head) + 2),
        _ => Err(RankError::InvalidHead(char::from(head))),
    }
}

fn integer_part(key: &str) -> RankResult<&str> {
    let head = *key.as_bytes().first().ok_or(RankError::Empty)?;
    let length = integer_length(head)?;
    if length > key.len() {
        return Err(RankError::Malformed(key.to_string()));
    }
    Ok(&key[..length])
}

fn validate_integer(integer: &str) -> RankResult<()> {
    let head = *integer.as_bytes().first().ok_or(RankError::Empty)?;
    if integer.len() == integer_length(head)? {
        Ok(())
    } else {
        Err(RankError::Malformed(integer.to_string()))
    }
}

fn validate_order_key(key: &str) -> RankResult<()> {
    if key.is_empty() {
        return Err(RankError::Empty);
    }
    if !key.is_ascii() || key == SMALLEST_INTEGER {
        return Err(RankError::Malformed(key.to_string()));
    }
    let integer = integer_part(key)?;
    for byte in key.bytes().skip(1) {
        digit_index(byte)?;
    }
    if key.len() > integer.len() && key.as_bytes().last() == Some(&ZERO) {
        return Err(RankError::Malformed(key.to_string()));
    }
    Ok(())
}

/// Digits strictly between two fractional parts, `b = None` meaning 1.0.
fn midpoint(a: &str, b: Option<&str>) -> RankResult<String> {
    if let Some(b) = b {
        if a >= b {
            return Err(RankError::OutOfOrder(a.to_string(), b.to_string()));
        }
    }
    if a.as_bytes().last() == Some(&ZERO) || b.and_then(|b| b.as_bytes().last()) == Some(&ZERO) {
        return Err(RankError::Malformed(format!("{a}|{}", b.unwrap_or(""))));
    }

    if let Some(b) = b {
        // strip the common prefix, reading missing digits of `a` as zero
        let a_bytes = a.as_bytes();
        let b_bytes = b.as_bytes();
        let mut n = 0;
        while n < b_bytes.len() && a_bytes.get(n).copied().unwrap_or(ZERO) == b_bytes[n] {
            n += 1;
        }
        if n > 0 {
            let rest_a = a.get(n..).unwrap_or("");
            return Ok(format!("{}{}", &b[..n], midpoint(rest_a, Some(&b[n..]))?));
        }
    }

    let digit_a = match a.as_bytes().first() {
        Some(digit) => digit_index(*digit)?,
        None => 0,
    };
    let digit_b = match b {
        Some(b) => digit_index(*b.as_bytes().first().ok_or(RankError::Empty)?)?,
        None => DIGITS.len(),
    };

    if digit_b > digit_a + 1 {
        let middle = (digit_a + digit_b + 1) / 2;
        return Ok(char::from(DIGITS[middle]).to_string());
    }

    match b {
        Some(b) if b.len() > 1 => Ok(b[..1].to_string()),
        _ => {
            let rest_a = a.get(1..).unwrap_or("");
            Ok(format!(
                "{}{}",
                char::from(DIGITS[digit_a]),
                midpoint(rest_a, None)?
            ))
        }
    }
}

fn increment_integer(integer: &str) -> RankResult<Option<String>> {
    validate_integer(integer)?;
    let head = integer.as_bytes()[0];
    let mut digits = integer.as_bytes()[1..].to_vec();

    let mut carry = true;
    for digit in digits.iter_mut().rev() {
        let next = digit_index(*digit)? + 1;
        if next == DIGITS.len() {
            *digit = ZERO;
        } else {
            *digit = DIGITS[next];
            carry = false;
            break;
        }
    }

    if carry {
        if head == b'Z' {
            return Ok(Some(format!("a{}", char::from(ZERO))));
        }
        if head == b'z' {
            return Ok(None);
        }
        let next_head = head + 1;
        if next_head > b'a' {
            digits.push(ZERO);
        } else {
            digits.pop();
        }
        return Ok(Some(assemble(next_head, &digits)));
    }
    Ok(Some(assemble(head, &digits)))
}

fn decrement_integer(integer: &str) -> RankResult<Option<String>> {
    validate_integer(integer)?;
    let head = integer.as_bytes()[0];
    let mut digits = integer.as_bytes()[1..].to_vec();

    let mut borrow = true;
    for digit in digits.iter_mut().rev() {
        let index = digit_index(*digit)?;
        if index == 0 {
            *digit = LAST_DIGIT;
        } else {
            *digit = DIGITS[index - 1];
            borrow = false;
            break;
        }
    }

    if borrow {
        if head == b'a' {
            return Ok(Some(format!("Z{}", char::from(LAST_DIGIT))));
        }
        if head == b'A' {
            return Ok(None);
        }
        let next_head = head - 1;
        if next_head < b'Z' {
            digits.push(LAST_DIGIT);
        } else {
            digits.pop();
        }
        return Ok(Some(assemble(next_head, &digits)));
    }
    Ok(Some(assemble(head, &digits)))
}

fn assemble(head: u8, digits: &[u8]) -> String {
    let mut key = String::with_capacity(digits.len() + 1);
    key.push(char::from(head));
    key.extend(digits.iter().copied().map(char::from));
    key
}

fn key_between(a: Option<&str>, b: Option<&str>) -> RankResult<String> {
    if let Some(a) = a {
        validate_order_key(a)?;
    }
    if let Some(b) = b {
        validate_order_key(b)?;
    }

    match (a, b) {
        (None, None) => Ok(MIDPOINT_KEY.to_string()),
        (None, Some(b)) => {
            let ib = integer_part(b)?;
            let fb = &b[ib.len()..];
            if ib == SMALLEST_INTEGER {
                return Ok(format!("{ib}{}", midpoint("", Some(fb))?));
            }
            if ib < b {
                return Ok(ib.to_string());
            }
            decrement_integer(ib)?.ok_or(RankError::Exhausted)
        }
        (Some(a), None) => {
            let ia = integer_part(a)?;
            let fa = &a[ia.len()..];
            match increment_integer(ia)? {
                Some(next) => Ok(next),
                None => Ok(format!("{ia}{}", midpoint(fa, None)?)),
            }
        }
        (Some(a), Some(b)) => {
            if a >= b {
                return Err(RankError::OutOfOrder(a.to_string(), b.to_string()));
            }
            let ia = integer_part(a)?;
            let fa = &a[ia.len()..];
            let ib = integer_part(b)?;
            let fb = &b[ib.len()..];
            if ia == ib {
                return Ok(format!("{ia}{}", midpoint(fa, Some(fb))?));
            }
            let next = increment_integer(ia)?.ok_or(RankError::Exhausted)?;
            if next.as_str() < b {
                return Ok(next);
            }
            Ok(format!("{ia}{}", midpoint(fa, None)?))
        }
    }
}

fn n_keys_between(a: Option<&str>, b: Option<&str>, count: usize) -> RankResult<Vec<String>> {
    match count {
        0 => return Ok(Vec::new()),
        1 => return Ok(vec![key_between(a, b)?]),
        _ => {}
    }

    if b.is_none() {
        let mut current = key_between(a, b)?;
        let mut keys = Vec::with_capacity(count);
        keys.push(current.clone());
        for _ in 1..count {
            current = key_between(Some(&current), b)?;
            keys.push(current.clone());
        }
        return Ok(keys);
    }

    if a.is_none() {
        let mut current = key_between(a, b)?;
        let mut keys = Vec::with_capacity(count);
        keys.push(current.clone());
        for _ in 1..count {
            current = key_between(a, Some(&current))?;
            keys.push(current.clone());
        }
        keys.reverse();
        return Ok(keys);
    }

    let half = count / 2;
    let middle = key_between(a, b)?;
    let mut keys = n_keys_between(a, Some(&middle), half)?;
    keys.push(middle.clone());
    keys.extend(n_keys_between(Some(&middle), b, count - half - 1)?);
    Ok(keys)
}
