//! Evaluating a combined unlocking and locking script.
//!
//! Script is a stack machine (like Forth) that evaluates a predicate returning a bool
//! indicating valid or not. There are no loops, but the program can grow while it runs: when
//! a push completes one of the P2SH or segwit v0 patterns, the script it commits to is parsed
//! and scheduled on the command stack.

use std::mem;

use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    buffer::BufferPool,
    hash,
    num,
    opcode::{
        self,
        table::{Context, OpcodeTable},
        Opcode::{self, *},
    },
    script::{self, template, Command, Script, MAX_SCRIPT_ELEMENT_SIZE, MAX_SCRIPT_SIZE},
    script_error::{ErrorSink, ScriptError},
    signature::{self, NullSignatureChecker, SignatureChecker},
    stack::{self, Stack},
};

/// Maximum number of non-push operations per script.
pub const MAX_OP_COUNT: usize = 201;

/// Maximum number of elements on the main and alt stacks combined.
pub const MAX_STACK_SIZE: usize = 1000;

bitflags::bitflags! {
    /// Script verification flags
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct Flags: u32 {
        /// Evaluate P2SH subscripts (softfork safe,
        /// [BIP16](https://github.com/bitcoin/bips/blob/master/bip-0016.mediawiki).
        const P2SH = 1 << 0;

        /// Passing a non-strict-DER signature or one with undefined hashtype to a checksig operation causes script failure.
        /// Evaluating a pubkey that is not (0x04 + 64 bytes) or (0x02 or 0x03 + 32 bytes) by checksig causes script failure.
        /// (softfork safe, but not used or intended as a consensus rule).
        const STRICT_ENC = 1 << 1;

        /// Passing a non-strict-DER signature or one with S > order/2 to a checksig operation causes script failure
        /// (softfork safe, [BIP62](https://github.com/bitcoin/bips/blob/master/bip-0062.mediawiki) rule 5).
        const LOW_S = 1 << 3;

        /// verify dummy stack item consumed by CHECKMULTISIG is of zero-length (softfork safe, [BIP62](https://github.com/bitcoin/bips/blob/master/bip-0062.mediawiki) rule 7).
        const NULL_DUMMY = 1 << 4;

        /// Using a non-push operator in the scriptSig causes script failure (softfork safe, [BIP62](https://github.com/bitcoin/bips/blob/master/bip-0062.mediawiki) rule 2).
        const SIG_PUSH_ONLY = 1 << 5;

        /// Require minimal encodings for all push operations (OP_0... OP_16, OP_1NEGATE where possible).
        /// Evaluating any other push causes the script to fail ([BIP62](https://github.com/bitcoin/bips/blob/master/bip-0062.mediawiki) rule 3).
        /// In addition, whenever a stack element is interpreted as a number, it must be of minimal length ([BIP62](https://github.com/bitcoin/bips/blob/master/bip-0062.mediawiki) rule 4).
        /// (softfork safe)
        const MINIMAL_DATA = 1 << 6;

        /// Discourage use of NOPs reserved for upgrades (NOP1-10)
        ///
        /// Provided so that nodes can avoid accepting or mining transactions
        /// containing executed NOP's whose meaning may change after a soft-fork,
        /// thus rendering the script invalid; with this flag set executing
        /// discouraged NOPs fails the script. This verification flag will never be
        /// a mandatory flag applied to scripts in a block. NOPs that are not
        /// executed, e.g.  within an unexecuted IF ENDIF block, are *not* rejected.
        const DISCOURAGE_UPGRADABLE_NOPS = 1 << 7;

        /// Verify CHECKLOCKTIMEVERIFY
        ///
        /// See [BIP65](https://github.com/bitcoin/bips/blob/master/bip-0065.mediawiki) for details.
        const CHECKLOCKTIMEVERIFY = 1 << 9;

        /// Expand version 0 witness programs (P2WPKH and P2WSH) using the witness
        /// ([BIP141](https://github.com/bitcoin/bips/blob/master/bip-0141.mediawiki)).
        const WITNESS = 1 << 11;
    }
}

impl Default for Flags {
    fn default() -> Self {
        Flags::P2SH | Flags::WITNESS
    }
}

/// Resource ceilings for one evaluation.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Limits {
    /// Main and alt stack elements, combined.
    pub max_stack_size: usize,
    /// Executed opcodes above `OP_16`, plus the keys of every `CHECKMULTISIG`.
    pub max_ops: usize,
    /// Largest element a push may place on the stack.
    pub max_element_size: usize,
    /// Pending commands, including the ones injected by P2SH and segwit.
    pub max_commands: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_stack_size: MAX_STACK_SIZE,
            max_ops: MAX_OP_COUNT,
            max_element_size: MAX_SCRIPT_ELEMENT_SIZE,
            max_commands: 3 * MAX_SCRIPT_SIZE,
        }
    }
}

/// Everything that can make an evaluation fail.
#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("script evaluated without error but finished with a false/empty top stack element")]
    EvalFalse,

    #[error("OP_RETURN encountered")]
    OpReturn,

    #[error("too many pending commands")]
    ScriptSize,

    #[error("push size exceeded maximum")]
    PushSize,

    #[error("operation count exceeded maximum")]
    OpCount,

    #[error("stack size exceeded maximum")]
    StackSize,

    #[error("signature count exceeded maximum")]
    SigCount,

    #[error("public key count exceeded maximum")]
    PubKeyCount,

    #[error("{} failed", opcode::mnemonic(*.0))]
    Verify(u8),

    #[error("no handler for {} ({:#04x})", opcode::mnemonic(*.0), .0)]
    UnknownOpcode(u8),

    #[error("disabled opcode {}", opcode::mnemonic(*.0))]
    DisabledOpcode(u8),

    #[error("invalid stack operation: {0}")]
    InvalidStackOperation(stack::Error),

    #[error("invalid altstack operation")]
    InvalidAltstackOperation,

    #[error("unbalanced conditional")]
    UnbalancedConditional,

    #[error("negative locktime")]
    NegativeLockTime,

    #[error("locktime requirement not satisfied")]
    UnsatisfiedLockTime,

    #[error("data push larger than necessary")]
    MinimalData,

    #[error("dummy CHECKMULTISIG argument must be zero")]
    SigNullDummy,

    #[error("public key is neither compressed or uncompressed")]
    PubKeyType,

    #[error("NOPx reserved for soft-fork upgrades")]
    DiscourageUpgradableNOPs,

    #[error("script number error: {0}")]
    Num(#[from] num::Error),

    #[error("{0}")]
    SignatureEncoding(#[from] signature::Error),

    #[error("redeem script doesn't match the committed hash")]
    ScriptHashMismatch,

    #[error("witness program hash mismatch")]
    WitnessProgramMismatch,

    #[error("witness program was passed an empty witness")]
    WitnessProgramWitnessEmpty,

    #[error("couldn't parse an injected script: {0}")]
    InjectedScript(#[from] script::Error),
}

impl From<stack::Error> for Error {
    fn from(value: stack::Error) -> Self {
        match value {
            stack::Error::Full { .. } => Error::StackSize,
            _ => Error::InvalidStackOperation(value),
        }
    }
}

impl Error {
    /// The result code reported for this failure.
    pub fn code(&self) -> ScriptError {
        match self {
            Error::EvalFalse | Error::ScriptHashMismatch => ScriptError::EvalFalse,
            Error::OpReturn => ScriptError::OpReturn,
            Error::ScriptSize => ScriptError::ScriptSize,
            Error::PushSize => ScriptError::PushSize,
            Error::OpCount => ScriptError::OpCount,
            Error::StackSize => ScriptError::StackSize,
            Error::SigCount => ScriptError::SigCount,
            Error::PubKeyCount => ScriptError::PubKeyCount,
            Error::Verify(byte) => match Opcode::from_byte(*byte) {
                Some(OP_EQUALVERIFY) => ScriptError::EqualVerify,
                Some(OP_NUMEQUALVERIFY) => ScriptError::NumEqualVerify,
                Some(OP_CHECKSIGVERIFY) => ScriptError::CheckSigVerify,
                Some(OP_CHECKMULTISIGVERIFY) => ScriptError::CheckMultisigVerify,
                _ => ScriptError::Verify,
            },
            Error::UnknownOpcode(_) => ScriptError::BadOpcode,
            Error::DisabledOpcode(_) => ScriptError::DisabledOpcode,
            Error::InvalidStackOperation(_) => ScriptError::InvalidStackOperation,
            Error::InvalidAltstackOperation => ScriptError::InvalidAltstackOperation,
            Error::UnbalancedConditional => ScriptError::UnbalancedConditional,
            Error::NegativeLockTime => ScriptError::NegativeLockTime,
            Error::UnsatisfiedLockTime => ScriptError::UnsatisfiedLockTime,
            Error::MinimalData => ScriptError::MinimalData,
            Error::SigNullDummy => ScriptError::SigNullDummy,
            Error::PubKeyType => ScriptError::PubKeyType,
            Error::DiscourageUpgradableNOPs => ScriptError::DiscourageUpgradableNOPs,
            Error::Num(_) => ScriptError::ScriptNum,
            Error::SignatureEncoding(e) => match e {
                signature::Error::SigHashType(_) => ScriptError::SigHashType,
                signature::Error::SigDER(_) => ScriptError::SigDER,
                signature::Error::SigHighS => ScriptError::SigHighS,
                signature::Error::PubKeyType => ScriptError::PubKeyType,
            },
            Error::WitnessProgramMismatch => ScriptError::WitnessProgramMismatch,
            Error::WitnessProgramWitnessEmpty => ScriptError::WitnessProgramWitnessEmpty,
            Error::InjectedScript(_) => ScriptError::UnknownError,
        }
    }
}

/// Any byte that isn't zero is true, except that a final `0x80` alone is negative zero.
pub fn cast_to_bool(vch: &[u8]) -> bool {
    match vch.iter().position(|b| *b != 0) {
        None => false,
        Some(i) => !(i == vch.len() - 1 && vch[i] == 0x80),
    }
}

/// Whether the element left on top when the program runs out counts as success. Only the
/// empty string, a single zero byte and a lone negative zero fail.
fn is_success(top: &[u8]) -> bool {
    !matches!(top, [] | [0x00] | [0x80])
}

/// Whether a push could have been written with a dedicated opcode instead.
fn is_minimal_push(data: &[u8]) -> bool {
    !matches!(data, [] | [1..=16] | [0x81])
}

/// An entry on the command stack.
///
/// Witness elements are data handed over by the spender, not pushes written in a script, so
/// they're kept apart from script commands and skip the minimal-push rule.
#[derive(Clone, PartialEq, Debug)]
enum Pending {
    Script(Command),
    Witness(Vec<u8>),
}

impl Pending {
    fn command(&self) -> Option<&Command> {
        match self {
            Pending::Script(command) => Some(command),
            Pending::Witness(_) => None,
        }
    }
}

/// The mutable part of an evaluation.
struct State {
    stack: Stack<Vec<u8>>,
    altstack: Stack<Vec<u8>>,
    /// The next command to run is on top.
    commands: Stack<Pending>,
    /// One entry per open IF, recording whether its current arm executes.
    vexec: Vec<bool>,
    op_count: usize,
}

impl State {
    fn new(script: Script, limits: &Limits, debug: bool) -> Result<Self, Error> {
        let mut state = State {
            stack: Stack::new(limits.max_stack_size).with_debug(debug),
            altstack: Stack::new(limits.max_stack_size).with_debug(debug),
            commands: Stack::new(limits.max_commands),
            vexec: vec![],
            op_count: 0,
        };
        state.run_next(script)?;
        Ok(state)
    }

    fn executing(&self) -> bool {
        self.vexec.iter().all(|b| *b)
    }

    /// Schedules `script` to run before anything already pending.
    fn run_next(&mut self, script: Script) -> Result<(), Error> {
        for command in script.into_commands().into_iter().rev() {
            self.commands
                .push(Pending::Script(command))
                .map_err(|_| Error::ScriptSize)?;
        }
        Ok(())
    }

    /// Schedules `commands` to run after everything already pending.
    fn run_last(&mut self, commands: impl IntoIterator<Item = Pending>) -> Result<(), Error> {
        for command in commands {
            self.commands.put_last(command).map_err(|_| Error::ScriptSize)?;
        }
        Ok(())
    }

    /// A version 0 witness program: exactly two elements, the empty version marker below the
    /// program.
    fn witness_program(&self) -> Option<&[u8]> {
        if self.stack.len() != 2 || !self.stack.peek_nth(2).ok()?.is_empty() {
            return None;
        }
        let program = self.stack.peek().ok()?;
        matches!(program.len(), 20 | 32).then_some(program.as_slice())
    }
}

/// Evaluates one script.
///
/// Configuration is builder style, and [`Interpreter::evaluate_script`] consumes the
/// interpreter, so each instance runs exactly once.
pub struct Interpreter<'a> {
    script: Script,
    sighash: [u8; 32],
    witness: Vec<Vec<u8>>,
    sink: &'a mut ErrorSink,
    flags: Flags,
    limits: Limits,
    checker: &'a dyn SignatureChecker,
    table: &'a OpcodeTable,
    pool: &'a BufferPool,
    debug: bool,
}

impl<'a> Interpreter<'a> {
    /// `script` is the unlocking script followed by the locking script. `witness` may be empty
    /// for non-segwit spends.
    pub fn new(
        script: Script,
        sighash: [u8; 32],
        witness: Vec<Vec<u8>>,
        sink: &'a mut ErrorSink,
    ) -> Self {
        Interpreter {
            script,
            sighash,
            witness,
            sink,
            flags: Flags::default(),
            limits: Limits::default(),
            checker: &NullSignatureChecker,
            table: OpcodeTable::standard(),
            pool: BufferPool::shared(),
            debug: false,
        }
    }

    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_checker(mut self, checker: &'a dyn SignatureChecker) -> Self {
        self.checker = checker;
        self
    }

    pub fn with_opcode_table(mut self, table: &'a OpcodeTable) -> Self {
        self.table = table;
        self
    }

    pub fn with_buffer_pool(mut self, pool: &'a BufferPool) -> Self {
        self.pool = pool;
        self
    }

    /// Trace the stacks after every access.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Runs the script to completion, latching exactly one code into the sink.
    ///
    /// The sink is reset first, so a sink left over from an earlier evaluation reports this
    /// one.
    pub fn evaluate_script(mut self) -> bool {
        self.sink.reset();
        let script = mem::take(&mut self.script);
        let result = State::new(script, &self.limits, self.debug)
            .and_then(|mut state| self.execute(&mut state));
        match result {
            Ok(()) => {
                debug!("script evaluated successfully");
                self.sink.set(ScriptError::Ok);
                true
            }
            Err(e) => {
                debug!(error = %e, "script evaluation failed");
                self.sink.set(e.code());
                false
            }
        }
    }

    fn execute(&mut self, state: &mut State) -> Result<(), Error> {
        while let Ok(pending) = state.commands.pop() {
            match pending {
                Pending::Script(command) => {
                    trace!(%command, depth = state.stack.len(), "step");
                    match command {
                        Command::PushData(data) => self.push_data(state, data, true)?,
                        Command::Opcode(byte) => self.step_opcode(state, byte)?,
                    }
                }
                Pending::Witness(data) => {
                    trace!(data = %hex::encode(&data), depth = state.stack.len(), "witness");
                    self.push_data(state, data, false)?
                }
            }
            if state.stack.len() + state.altstack.len() > self.limits.max_stack_size {
                return Err(Error::StackSize);
            }
        }

        if !state.vexec.is_empty() {
            return Err(Error::UnbalancedConditional);
        }
        match state.stack.peek() {
            Ok(top) if is_success(top) => Ok(()),
            _ => Err(Error::EvalFalse),
        }
    }

    /// `minimal` applies the minimal-push rule, which only makes sense for pushes written in a
    /// script.
    fn push_data(&mut self, state: &mut State, data: Vec<u8>, minimal: bool) -> Result<(), Error> {
        if data.len() > self.limits.max_element_size {
            return Err(Error::PushSize);
        }
        if !state.executing() {
            return Ok(());
        }
        if minimal && self.flags.contains(Flags::MINIMAL_DATA) && !is_minimal_push(&data) {
            return Err(Error::MinimalData);
        }
        state.stack.push(data)?;

        if self.flags.contains(Flags::P2SH) && state.commands.len() == 3 {
            let next = state.commands.iter().map_while(Pending::command);
            if let Some(expected) = template::script_hash_check(next) {
                self.redeem_script_hash(state, expected)?;
            }
        }
        if self.flags.contains(Flags::WITNESS) {
            if let Some(program) = state.witness_program().map(<[u8]>::to_vec) {
                state.stack.pop()?;
                state.stack.pop()?;
                match <[u8; 32]>::try_from(program.as_slice()) {
                    Ok(program) => self.redeem_witness_script_hash(state, program)?,
                    Err(_) => self.redeem_witness_pub_key_hash(state, &program)?,
                }
            }
        }
        Ok(())
    }

    /// `OP_HASH160 <hash> OP_EQUAL` is all that's left, so the element just pushed is a redeem
    /// script to check against `expected` and then run.
    fn redeem_script_hash(&mut self, state: &mut State, expected: [u8; 20]) -> Result<(), Error> {
        for _ in 0..3 {
            state.commands.pop()?;
        }
        let redeem = state.stack.pop()?;
        if hash::hash160(&redeem) != expected {
            return Err(Error::ScriptHashMismatch);
        }
        let redeem = Script::parse_raw_with(&redeem, self.pool)?;
        debug!(hash = %hex::encode(expected), commands = redeem.len(), "redeeming P2SH script");
        state.run_next(redeem)
    }

    fn redeem_witness_pub_key_hash(
        &mut self,
        state: &mut State,
        program: &[u8],
    ) -> Result<(), Error> {
        let witness = mem::take(&mut self.witness);
        debug!(
            hash = %hex::encode(program),
            witness = witness.len(),
            "expanding P2WPKH program"
        );
        state.run_last(witness.into_iter().map(Pending::Witness))?;
        state.run_last(
            [
                OP_DUP.into(),
                OP_HASH160.into(),
                Command::push(program),
                OP_EQUALVERIFY.into(),
                OP_CHECKSIG.into(),
            ]
            .map(Pending::Script),
        )
    }

    fn redeem_witness_script_hash(
        &mut self,
        state: &mut State,
        program: [u8; 32],
    ) -> Result<(), Error> {
        let mut witness = mem::take(&mut self.witness);
        let witness_script = witness.pop().ok_or(Error::WitnessProgramWitnessEmpty)?;
        if hash::sha256(&witness_script) != program {
            return Err(Error::WitnessProgramMismatch);
        }
        let witness_script = Script::parse_raw_with(&witness_script, self.pool)?;
        debug!(
            hash = %hex::encode(program),
            witness = witness.len(),
            commands = witness_script.len(),
            "expanding P2WSH program"
        );
        state.run_last(witness.into_iter().map(Pending::Witness))?;
        state.run_last(witness_script.into_commands().into_iter().map(Pending::Script))
    }

    fn step_opcode(&self, state: &mut State, byte: u8) -> Result<(), Error> {
        let executing = state.executing();
        let op = Opcode::from_byte(byte);

        // These fail even in an unexecuted branch.
        if opcode::is_disabled(byte) {
            return Err(Error::DisabledOpcode(byte));
        }
        if matches!(op, Some(OP_VERIF | OP_VERNOTIF)) {
            return Err(Error::UnknownOpcode(byte));
        }

        if byte > u8::from(OP_16) {
            state.op_count += 1;
            if state.op_count > self.limits.max_ops {
                return Err(Error::OpCount);
            }
        }

        match op {
            Some(OP_IF | OP_NOTIF) => {
                let mut value = false;
                if executing {
                    let top = state
                        .stack
                        .pop()
                        .map_err(|_| Error::UnbalancedConditional)?;
                    value = cast_to_bool(&top) == (op == Some(OP_IF));
                }
                state.vexec.push(value);
            }
            Some(OP_ELSE) => {
                let last = state
                    .vexec
                    .last_mut()
                    .ok_or(Error::UnbalancedConditional)?;
                *last = !*last;
            }
            Some(OP_ENDIF) => {
                state.vexec.pop().ok_or(Error::UnbalancedConditional)?;
            }
            _ if !executing => {}
            _ => {
                let handler = self.table.get(byte).ok_or(Error::UnknownOpcode(byte))?;
                handler(&mut Context {
                    opcode: byte,
                    stack: &mut state.stack,
                    altstack: &mut state.altstack,
                    op_count: &mut state.op_count,
                    flags: self.flags,
                    limits: &self.limits,
                    checker: self.checker,
                    sighash: &self.sighash,
                })?;
            }
        }
        Ok(())
    }
}
