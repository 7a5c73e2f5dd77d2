//! Opcode dispatch.
//!
//! An [`OpcodeTable`] maps opcode bytes to plain functions over a [`Context`]. Flow control,
//! disabled opcodes and the operation count are handled by the interpreter before dispatch,
//! so handlers only ever run on the executed branch.

use std::fmt;

use super::Opcode::{self, *};
use crate::{
    hash,
    interpreter::{cast_to_bool, Error, Flags, Limits},
    num,
    signature::{self, SignatureChecker},
    stack::{self, Stack},
};

/// Maximum number of public keys per multisig.
pub const MAX_PUBKEYS_PER_MULTISIG: i64 = 20;

/// Everything a handler may read or mutate.
pub struct Context<'a> {
    /// The byte being executed, so one handler can serve several opcodes.
    pub opcode: u8,
    pub stack: &'a mut Stack<Vec<u8>>,
    pub altstack: &'a mut Stack<Vec<u8>>,
    pub op_count: &'a mut usize,
    pub flags: Flags,
    pub limits: &'a Limits,
    pub checker: &'a dyn SignatureChecker,
    pub sighash: &'a [u8; 32],
}

impl Context<'_> {
    fn op(&self) -> Option<Opcode> {
        Opcode::from_byte(self.opcode)
    }

    /// Fail unless the main stack holds at least `n` elements.
    pub fn require(&self, n: usize) -> Result<(), Error> {
        if self.stack.len() < n {
            Err(Error::InvalidStackOperation(stack::Error::NotFound {
                index: n,
                len: self.stack.len(),
            }))
        } else {
            Ok(())
        }
    }

    pub fn pop(&mut self) -> Result<Vec<u8>, Error> {
        Ok(self.stack.pop()?)
    }

    pub fn push(&mut self, element: Vec<u8>) -> Result<(), Error> {
        Ok(self.stack.push(element)?)
    }

    pub fn push_bool(&mut self, value: bool) -> Result<(), Error> {
        self.push(if value { vec![1] } else { vec![] })
    }

    pub fn push_num(&mut self, value: i64) -> Result<(), Error> {
        self.push(num::serialize(value))
    }

    pub fn pop_num(&mut self) -> Result<i64, Error> {
        let top = self.pop()?;
        Ok(num::parse(
            &top,
            self.flags.contains(Flags::MINIMAL_DATA),
            num::DEFAULT_MAX_SIZE,
        )?)
    }

    fn peek_clone(&self, n: usize) -> Result<Vec<u8>, Error> {
        Ok(self.stack.peek_nth(n)?.clone())
    }

    /// The `VERIFY` half of the `*VERIFY` opcodes.
    fn verify(&self, value: bool) -> Result<(), Error> {
        if value {
            Ok(())
        } else {
            Err(Error::Verify(self.opcode))
        }
    }
}

pub type Handler = fn(&mut Context<'_>) -> Result<(), Error>;

/// An immutable mapping from opcode byte to handler.
#[derive(Clone)]
pub struct OpcodeTable {
    handlers: [Option<Handler>; 256],
}

lazy_static::lazy_static! {
    static ref STANDARD: OpcodeTable = OpcodeTable::build_standard();
}

impl OpcodeTable {
    /// A table with no handlers. Every opcode it's asked about is unknown.
    pub fn empty() -> Self {
        OpcodeTable {
            handlers: [None; 256],
        }
    }

    /// The shared table with every enabled opcode.
    pub fn standard() -> &'static OpcodeTable {
        &STANDARD
    }

    pub fn with(mut self, opcode: impl Into<u8>, handler: Handler) -> Self {
        self.handlers[usize::from(opcode.into())] = Some(handler);
        self
    }

    pub fn without(mut self, opcode: impl Into<u8>) -> Self {
        self.handlers[usize::from(opcode.into())] = None;
        self
    }

    pub fn get(&self, opcode: u8) -> Option<Handler> {
        self.handlers[usize::from(opcode)]
    }

    fn build_standard() -> Self {
        let mut table = OpcodeTable::empty()
            .with(OP_0, op_false)
            .with(OP_1NEGATE, op_small_int)
            .with(OP_NOP, op_nop)
            .with(OP_NOP1, op_upgradable_nop)
            .with(OP_CHECKSEQUENCEVERIFY, op_upgradable_nop)
            .with(OP_CHECKLOCKTIMEVERIFY, op_checklocktimeverify)
            .with(OP_VERIFY, op_verify)
            .with(OP_RETURN, op_return)
            .with(OP_TOALTSTACK, op_toaltstack)
            .with(OP_FROMALTSTACK, op_fromaltstack)
            .with(OP_2DROP, op_2drop)
            .with(OP_2DUP, op_2dup)
            .with(OP_3DUP, op_3dup)
            .with(OP_2OVER, op_2over)
            .with(OP_2ROT, op_2rot)
            .with(OP_2SWAP, op_2swap)
            .with(OP_IFDUP, op_ifdup)
            .with(OP_DEPTH, op_depth)
            .with(OP_DROP, op_drop)
            .with(OP_DUP, op_dup)
            .with(OP_NIP, op_nip)
            .with(OP_OVER, op_over)
            .with(OP_PICK, op_pick_roll)
            .with(OP_ROLL, op_pick_roll)
            .with(OP_ROT, op_rot)
            .with(OP_SWAP, op_swap)
            .with(OP_TUCK, op_tuck)
            .with(OP_SIZE, op_size)
            .with(OP_EQUAL, op_equal)
            .with(OP_EQUALVERIFY, op_equal)
            .with(OP_WITHIN, op_within)
            .with(OP_CODESEPARATOR, op_nop)
            .with(OP_CHECKSIG, op_checksig)
            .with(OP_CHECKSIGVERIFY, op_checksig)
            .with(OP_CHECKMULTISIG, op_checkmultisig)
            .with(OP_CHECKMULTISIGVERIFY, op_checkmultisig);
        for n in 1..=16 {
            if let Some(op) = Opcode::from_small_int(n) {
                table = table.with(op, op_small_int);
            }
        }
        for op in [OP_NOP4, OP_NOP5, OP_NOP6, OP_NOP7, OP_NOP8, OP_NOP9, OP_NOP10] {
            table = table.with(op, op_upgradable_nop);
        }
        for op in [OP_1ADD, OP_1SUB, OP_NEGATE, OP_ABS, OP_NOT, OP_0NOTEQUAL] {
            table = table.with(op, op_unary_num);
        }
        for op in [
            OP_ADD,
            OP_SUB,
            OP_BOOLAND,
            OP_BOOLOR,
            OP_NUMEQUAL,
            OP_NUMEQUALVERIFY,
            OP_NUMNOTEQUAL,
            OP_LESSTHAN,
            OP_GREATERTHAN,
            OP_LESSTHANOREQUAL,
            OP_GREATERTHANOREQUAL,
            OP_MIN,
            OP_MAX,
        ] {
            table = table.with(op, op_binary_num);
        }
        for op in [OP_RIPEMD160, OP_SHA1, OP_SHA256, OP_HASH160, OP_HASH256] {
            table = table.with(op, op_hash);
        }
        table
    }
}

impl Default for OpcodeTable {
    fn default() -> Self {
        OpcodeTable::standard().clone()
    }
}

impl fmt::Debug for OpcodeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpcodeTable")
            .field(
                "handled",
                &self.handlers.iter().filter(|h| h.is_some()).count(),
            )
            .finish()
    }
}

//
// push value
//

fn op_false(ctx: &mut Context<'_>) -> Result<(), Error> {
    ctx.push(vec![])
}

fn op_small_int(ctx: &mut Context<'_>) -> Result<(), Error> {
    let n = match ctx.op() {
        Some(OP_1NEGATE) => -1,
        Some(op) => op.small_int().map_or(0, i64::from),
        None => 0,
    };
    ctx.push_num(n)
}

//
// control
//

fn op_nop(_ctx: &mut Context<'_>) -> Result<(), Error> {
    Ok(())
}

fn op_upgradable_nop(ctx: &mut Context<'_>) -> Result<(), Error> {
    if ctx.flags.contains(Flags::DISCOURAGE_UPGRADABLE_NOPS) {
        Err(Error::DiscourageUpgradableNOPs)
    } else {
        Ok(())
    }
}

fn op_checklocktimeverify(ctx: &mut Context<'_>) -> Result<(), Error> {
    if !ctx.flags.contains(Flags::CHECKLOCKTIMEVERIFY) {
        return op_upgradable_nop(ctx);
    }
    // The lock time stays on the stack, so the opcode behaves like a NOP for nodes that
    // don't enforce it.
    let lock_time = num::parse(
        ctx.stack.peek()?,
        ctx.flags.contains(Flags::MINIMAL_DATA),
        num::LOCK_TIME_MAX_SIZE,
    )?;
    if lock_time < 0 {
        Err(Error::NegativeLockTime)
    } else if !ctx.checker.check_lock_time(lock_time) {
        Err(Error::UnsatisfiedLockTime)
    } else {
        Ok(())
    }
}

fn op_verify(ctx: &mut Context<'_>) -> Result<(), Error> {
    let value = cast_to_bool(ctx.stack.peek()?);
    ctx.verify(value)?;
    ctx.pop().map(|_| ())
}

fn op_return(_ctx: &mut Context<'_>) -> Result<(), Error> {
    Err(Error::OpReturn)
}

//
// stack ops
//

fn op_toaltstack(ctx: &mut Context<'_>) -> Result<(), Error> {
    let top = ctx.pop()?;
    Ok(ctx.altstack.push(top)?)
}

fn op_fromaltstack(ctx: &mut Context<'_>) -> Result<(), Error> {
    let top = ctx
        .altstack
        .pop()
        .map_err(|_| Error::InvalidAltstackOperation)?;
    ctx.push(top)
}

fn op_2drop(ctx: &mut Context<'_>) -> Result<(), Error> {
    ctx.require(2)?;
    ctx.pop()?;
    ctx.pop().map(|_| ())
}

// (x1 x2 -- x1 x2 x1 x2)
fn op_2dup(ctx: &mut Context<'_>) -> Result<(), Error> {
    ctx.require(2)?;
    let x1 = ctx.peek_clone(2)?;
    let x2 = ctx.peek_clone(1)?;
    ctx.push(x1)?;
    ctx.push(x2)
}

// (x1 x2 x3 -- x1 x2 x3 x1 x2 x3)
fn op_3dup(ctx: &mut Context<'_>) -> Result<(), Error> {
    ctx.require(3)?;
    let x1 = ctx.peek_clone(3)?;
    let x2 = ctx.peek_clone(2)?;
    let x3 = ctx.peek_clone(1)?;
    ctx.push(x1)?;
    ctx.push(x2)?;
    ctx.push(x3)
}

// (x1 x2 x3 x4 -- x1 x2 x3 x4 x1 x2)
fn op_2over(ctx: &mut Context<'_>) -> Result<(), Error> {
    ctx.require(4)?;
    let x1 = ctx.peek_clone(4)?;
    let x2 = ctx.peek_clone(3)?;
    ctx.push(x1)?;
    ctx.push(x2)
}

// (x1 x2 x3 x4 x5 x6 -- x3 x4 x5 x6 x1 x2)
fn op_2rot(ctx: &mut Context<'_>) -> Result<(), Error> {
    ctx.require(6)?;
    let x1 = ctx.stack.remove_nth(6)?;
    let x2 = ctx.stack.remove_nth(5)?;
    ctx.push(x1)?;
    ctx.push(x2)
}

// (x1 x2 x3 x4 -- x3 x4 x1 x2)
fn op_2swap(ctx: &mut Context<'_>) -> Result<(), Error> {
    ctx.require(4)?;
    ctx.stack.swap(4, 2)?;
    Ok(ctx.stack.swap(3, 1)?)
}

// (x - 0 | x x)
fn op_ifdup(ctx: &mut Context<'_>) -> Result<(), Error> {
    let top = ctx.peek_clone(1)?;
    if cast_to_bool(&top) {
        ctx.push(top)?;
    }
    Ok(())
}

// -- stacksize
fn op_depth(ctx: &mut Context<'_>) -> Result<(), Error> {
    let depth = i64::try_from(ctx.stack.len()).map_err(|_| Error::StackSize)?;
    ctx.push_num(depth)
}

fn op_drop(ctx: &mut Context<'_>) -> Result<(), Error> {
    ctx.pop().map(|_| ())
}

fn op_dup(ctx: &mut Context<'_>) -> Result<(), Error> {
    let top = ctx.peek_clone(1)?;
    ctx.push(top)
}

// (x1 x2 -- x2)
fn op_nip(ctx: &mut Context<'_>) -> Result<(), Error> {
    ctx.require(2)?;
    ctx.stack.remove_nth(2).map(|_| ())?;
    Ok(())
}

// (x1 x2 -- x1 x2 x1)
fn op_over(ctx: &mut Context<'_>) -> Result<(), Error> {
    let x1 = ctx.peek_clone(2)?;
    ctx.push(x1)
}

// (xn ... x2 x1 x0 n - xn ... x2 x1 x0 xn)
// (xn ... x2 x1 x0 n - ... x2 x1 x0 xn)
fn op_pick_roll(ctx: &mut Context<'_>) -> Result<(), Error> {
    ctx.require(2)?;
    let n = ctx.pop_num()?;
    let len = ctx.stack.len();
    let depth = usize::try_from(n)
        .ok()
        .filter(|n| *n < len)
        .ok_or(Error::InvalidStackOperation(stack::Error::NotFound {
            index: n.max(0) as usize,
            len,
        }))?;
    let value = if ctx.op() == Some(OP_ROLL) {
        ctx.stack.remove_nth(depth + 1)?
    } else {
        ctx.peek_clone(depth + 1)?
    };
    ctx.push(value)
}

// (x1 x2 x3 -- x2 x3 x1)
fn op_rot(ctx: &mut Context<'_>) -> Result<(), Error> {
    ctx.require(3)?;
    let x1 = ctx.stack.remove_nth(3)?;
    ctx.push(x1)
}

// (x1 x2 -- x2 x1)
fn op_swap(ctx: &mut Context<'_>) -> Result<(), Error> {
    ctx.require(2)?;
    Ok(ctx.stack.swap(1, 2)?)
}

// (x1 x2 -- x2 x1 x2)
fn op_tuck(ctx: &mut Context<'_>) -> Result<(), Error> {
    ctx.require(2)?;
    let x2 = ctx.peek_clone(1)?;
    Ok(ctx.stack.insert_nth(3, x2)?)
}

//
// splice ops
//

// (in -- in size)
fn op_size(ctx: &mut Context<'_>) -> Result<(), Error> {
    let size = i64::try_from(ctx.stack.peek()?.len()).map_err(|_| Error::PushSize)?;
    ctx.push_num(size)
}

//
// bitwise logic
//

// (x1 x2 - bool)
fn op_equal(ctx: &mut Context<'_>) -> Result<(), Error> {
    ctx.require(2)?;
    let x2 = ctx.pop()?;
    let x1 = ctx.pop()?;
    let equal = x1 == x2;
    if ctx.op() == Some(OP_EQUALVERIFY) {
        ctx.verify(equal)
    } else {
        ctx.push_bool(equal)
    }
}

//
// numeric
//

// (in -- out)
fn op_unary_num(ctx: &mut Context<'_>) -> Result<(), Error> {
    let bn = ctx.pop_num()?;
    let out = match ctx.op() {
        Some(OP_1ADD) => bn + 1,
        Some(OP_1SUB) => bn - 1,
        Some(OP_NEGATE) => -bn,
        Some(OP_ABS) => bn.abs(),
        Some(OP_NOT) => i64::from(bn == 0),
        Some(OP_0NOTEQUAL) => i64::from(bn != 0),
        _ => return Err(Error::UnknownOpcode(ctx.opcode)),
    };
    ctx.push_num(out)
}

// (x1 x2 -- out)
fn op_binary_num(ctx: &mut Context<'_>) -> Result<(), Error> {
    ctx.require(2)?;
    let bn2 = ctx.pop_num()?;
    let bn1 = ctx.pop_num()?;
    let out = match ctx.op() {
        Some(OP_ADD) => bn1 + bn2,
        Some(OP_SUB) => bn1 - bn2,
        Some(OP_BOOLAND) => i64::from(bn1 != 0 && bn2 != 0),
        Some(OP_BOOLOR) => i64::from(bn1 != 0 || bn2 != 0),
        Some(OP_NUMEQUAL) | Some(OP_NUMEQUALVERIFY) => i64::from(bn1 == bn2),
        Some(OP_NUMNOTEQUAL) => i64::from(bn1 != bn2),
        Some(OP_LESSTHAN) => i64::from(bn1 < bn2),
        Some(OP_GREATERTHAN) => i64::from(bn1 > bn2),
        Some(OP_LESSTHANOREQUAL) => i64::from(bn1 <= bn2),
        Some(OP_GREATERTHANOREQUAL) => i64::from(bn1 >= bn2),
        Some(OP_MIN) => bn1.min(bn2),
        Some(OP_MAX) => bn1.max(bn2),
        _ => return Err(Error::UnknownOpcode(ctx.opcode)),
    };
    if ctx.op() == Some(OP_NUMEQUALVERIFY) {
        ctx.verify(out != 0)
    } else {
        ctx.push_num(out)
    }
}

// (x min max -- out)
fn op_within(ctx: &mut Context<'_>) -> Result<(), Error> {
    ctx.require(3)?;
    let max = ctx.pop_num()?;
    let min = ctx.pop_num()?;
    let x = ctx.pop_num()?;
    ctx.push_bool(min <= x && x < max)
}

//
// crypto
//

// (in -- hash)
fn op_hash(ctx: &mut Context<'_>) -> Result<(), Error> {
    let vch = ctx.pop()?;
    let hashed = match ctx.op() {
        Some(OP_RIPEMD160) => hash::ripemd160(&vch).to_vec(),
        Some(OP_SHA1) => hash::sha1(&vch).to_vec(),
        Some(OP_SHA256) => hash::sha256(&vch).to_vec(),
        Some(OP_HASH160) => hash::hash160(&vch).to_vec(),
        Some(OP_HASH256) => hash::hash256(&vch).to_vec(),
        _ => return Err(Error::UnknownOpcode(ctx.opcode)),
    };
    ctx.push(hashed)
}

fn check_sig(ctx: &Context<'_>, sig: &[u8], pub_key: &[u8]) -> Result<bool, Error> {
    signature::check_signature_encoding(sig, ctx.flags)?;
    signature::check_pub_key_encoding(pub_key, ctx.flags).map_err(|_| Error::PubKeyType)?;
    Ok(ctx.checker.check_sig(sig, pub_key, ctx.sighash))
}

// (sig pubkey -- bool)
fn op_checksig(ctx: &mut Context<'_>) -> Result<(), Error> {
    ctx.require(2)?;
    let pub_key = ctx.pop()?;
    let sig = ctx.pop()?;
    let success = check_sig(ctx, &sig, &pub_key)?;
    if ctx.op() == Some(OP_CHECKSIGVERIFY) {
        ctx.verify(success)
    } else {
        ctx.push_bool(success)
    }
}

// ([dummy] [sig ...] num_of_signatures [pubkey ...] num_of_pubkeys -- bool)
fn op_checkmultisig(ctx: &mut Context<'_>) -> Result<(), Error> {
    let keys_count = ctx.pop_num()?;
    if !(0..=MAX_PUBKEYS_PER_MULTISIG).contains(&keys_count) {
        return Err(Error::PubKeyCount);
    }
    let keys_count = keys_count as usize;
    *ctx.op_count += keys_count;
    if *ctx.op_count > ctx.limits.max_ops {
        return Err(Error::OpCount);
    }
    ctx.require(keys_count)?;
    let mut keys = Vec::with_capacity(keys_count);
    for _ in 0..keys_count {
        keys.push(ctx.pop()?);
    }

    let sigs_count = ctx.pop_num()?;
    if sigs_count < 0 || sigs_count as usize > keys_count {
        return Err(Error::SigCount);
    }
    let sigs_count = sigs_count as usize;
    ctx.require(sigs_count)?;
    let mut sigs = Vec::with_capacity(sigs_count);
    for _ in 0..sigs_count {
        sigs.push(ctx.pop()?);
    }

    // An off-by-one in the original protocol consumes one extra element.
    let dummy = ctx.pop()?;
    if ctx.flags.contains(Flags::NULL_DUMMY) && !dummy.is_empty() {
        return Err(Error::SigNullDummy);
    }

    // Both lists were popped top first. Signatures must match keys in push order.
    let mut keys = keys.iter().rev();
    let mut success = true;
    for sig in sigs.iter().rev() {
        let mut matched = false;
        // Keep consuming keys until one verifies this signature, or we run out.
        for key in keys.by_ref() {
            if check_sig(ctx, sig, key)? {
                matched = true;
                break;
            }
        }
        if !matched {
            success = false;
            break;
        }
    }

    if ctx.op() == Some(OP_CHECKMULTISIGVERIFY) {
        ctx.verify(success)
    } else {
        ctx.push_bool(success)
    }
}
