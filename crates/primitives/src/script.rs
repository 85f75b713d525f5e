//! Script parsing helpers used by consensus checks.
//!
//! Only the shapes consensus needs to recognise are understood here: data
//! pushes, pay-to-pubkey, OP_RETURN carrying a pubkey and the witness
//! commitment. Full evaluation lives behind a verifier trait elsewhere.

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_1: u8 = 0x51;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKSIGVERIFY: u8 = 0xad;
pub const OP_CHECKMULTISIG: u8 = 0xae;
pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;

const MAX_PUBKEYS_PER_MULTISIG: u32 = 20;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Instruction<'a> {
    Push(&'a [u8]),
    Op(u8),
}

/// Iterates instructions, yielding `Err(())` once on a truncated push.
pub struct Instructions<'a> {
    script: &'a [u8],
    cursor: usize,
    failed: bool,
}

pub fn instructions(script: &[u8]) -> Instructions<'_> {
    Instructions {
        script,
        cursor: 0,
        failed: false,
    }
}

impl<'a> Instructions<'a> {
    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.cursor.checked_add(len)?;
        let slice = self.script.get(self.cursor..end)?;
        self.cursor = end;
        Some(slice)
    }

    fn take_len(&mut self, width: usize) -> Option<usize> {
        let bytes = self.take(width)?;
        let mut buf = [0u8; 4];
        buf[..width].copy_from_slice(bytes);
        Some(u32::from_le_bytes(buf) as usize)
    }
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Result<Instruction<'a>, ()>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor >= self.script.len() {
            return None;
        }
        let opcode = self.script[self.cursor];
        self.cursor += 1;
        let len = match opcode {
            0x01..=0x4b => Some(opcode as usize),
            OP_PUSHDATA1 => self.take_len(1),
            OP_PUSHDATA2 => self.take_len(2),
            OP_PUSHDATA4 => self.take_len(4),
            _ => return Some(Ok(Instruction::Op(opcode))),
        };
        match len.and_then(|len| self.take(len)) {
            Some(data) => Some(Ok(Instruction::Push(data))),
            None => {
                self.failed = true;
                Some(Err(()))
            }
        }
    }
}

/// Signature operations counted the legacy (inaccurate) way.
pub fn legacy_sigops(script: &[u8]) -> u32 {
    let mut count = 0u32;
    for instruction in instructions(script) {
        match instruction {
            Ok(Instruction::Op(OP_CHECKSIG | OP_CHECKSIGVERIFY)) => count += 1,
            Ok(Instruction::Op(OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY)) => {
                count += MAX_PUBKEYS_PER_MULTISIG
            }
            Ok(_) => {}
            Err(()) => break,
        }
    }
    count
}

pub fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    let len = data.len();
    if len < OP_PUSHDATA1 as usize {
        script.push(len as u8);
    } else if len <= 0xff {
        script.push(OP_PUSHDATA1);
        script.push(len as u8);
    } else if len <= 0xffff {
        script.push(OP_PUSHDATA2);
        script.extend_from_slice(&(len as u16).to_le_bytes());
    } else {
        script.push(OP_PUSHDATA4);
        script.extend_from_slice(&(len as u32).to_le_bytes());
    }
    script.extend_from_slice(data);
}

fn script_num(value: i64) -> Vec<u8> {
    let mut out = Vec::new();
    let mut abs = value.unsigned_abs();
    while abs > 0 {
        out.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    if let Some(last) = out.last_mut() {
        if *last & 0x80 != 0 {
            out.push(if value < 0 { 0x80 } else { 0 });
        } else if value < 0 {
            *last |= 0x80;
        }
    }
    out
}

/// Minimal push of a script number, as BIP34 coinbase heights are encoded.
pub fn push_int(value: i64) -> Vec<u8> {
    match value {
        0 => vec![OP_0],
        -1 => vec![OP_1NEGATE],
        1..=16 => vec![OP_1 + (value as u8 - 1)],
        _ => {
            let mut script = Vec::with_capacity(9);
            push_data(&mut script, &script_num(value));
            script
        }
    }
}

fn is_pubkey_len(len: usize) -> bool {
    len == 33 || len == 65
}

/// `<pubkey> OP_CHECKSIG`
pub fn p2pk_script(pubkey: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(pubkey.len() + 2);
    push_data(&mut script, pubkey);
    script.push(OP_CHECKSIG);
    script
}

pub fn p2pk_pubkey(script: &[u8]) -> Option<&[u8]> {
    let mut iter = instructions(script);
    let key = match iter.next()? {
        Ok(Instruction::Push(data)) if is_pubkey_len(data.len()) => data,
        _ => return None,
    };
    match (iter.next(), iter.next()) {
        (Some(Ok(Instruction::Op(OP_CHECKSIG))), None) => Some(key),
        _ => None,
    }
}

/// `OP_RETURN <pubkey>`, the cold-staking friendly way to name a block signer.
pub fn op_return_pubkey(script: &[u8]) -> Option<&[u8]> {
    let mut iter = instructions(script);
    if !matches!(iter.next()?, Ok(Instruction::Op(OP_RETURN))) {
        return None;
    }
    match (iter.next(), iter.next()) {
        (Some(Ok(Instruction::Push(data))), None) if is_pubkey_len(data.len()) => Some(data),
        _ => None,
    }
}

pub fn is_unspendable(script: &[u8]) -> bool {
    script.first() == Some(&OP_RETURN)
}

/// The 32-byte commitment from an `OP_RETURN 0x24 aa21a9ed <hash>` output.
pub fn witness_commitment(script: &[u8], header: &[u8; 4]) -> Option<[u8; 32]> {
    if script.len() < 38 || script[0] != OP_RETURN || script[1] != 0x24 || &script[2..6] != header
    {
        return None;
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&script[6..38]);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_int_encodings() {
        assert_eq!(push_int(0), vec![OP_0]);
        assert_eq!(push_int(16), vec![0x60]);
        assert_eq!(push_int(17), vec![0x01, 0x11]);
        assert_eq!(push_int(128), vec![0x02, 0x80, 0x00]);
        assert_eq!(push_int(500_000), vec![0x03, 0x20, 0xa1, 0x07]);
        assert_eq!(push_int(-1), vec![OP_1NEGATE]);
    }

    #[test]
    fn sigops_stop_at_truncated_push() {
        let script = [OP_CHECKSIG, OP_CHECKMULTISIG, 0x05, 0x01];
        assert_eq!(legacy_sigops(&script), 21);
        let pushed_checksig = [0x01, OP_CHECKSIG, OP_CHECKSIGVERIFY];
        assert_eq!(legacy_sigops(&pushed_checksig), 1);
    }

    #[test]
    fn recognises_signer_scripts() {
        let key = [0x02u8; 33];
        let p2pk = p2pk_script(&key);
        assert_eq!(p2pk_pubkey(&p2pk), Some(&key[..]));
        assert_eq!(op_return_pubkey(&p2pk), None);

        let mut op_return = vec![OP_RETURN];
        push_data(&mut op_return, &key);
        assert_eq!(op_return_pubkey(&op_return), Some(&key[..]));
        assert_eq!(p2pk_pubkey(&op_return), None);

        let mut trailing = p2pk.clone();
        trailing.push(OP_CHECKSIG);
        assert_eq!(p2pk_pubkey(&trailing), None);
        assert_eq!(p2pk_pubkey(&p2pk_script(&[0x02; 20])), None);
    }

    #[test]
    fn witness_commitment_extraction() {
        let header = [0xaa, 0x21, 0xa9, 0xed];
        let mut script = vec![OP_RETURN, 0x24];
        script.extend_from_slice(&header);
        script.extend_from_slice(&[7u8; 32]);
        assert_eq!(witness_commitment(&script, &header), Some([7u8; 32]));
        script[2] = 0;
        assert_eq!(witness_commitment(&script, &header), None);
    }
}
