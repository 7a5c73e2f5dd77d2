#![no_main]

use libfuzzer_sys::fuzz_target;
extern crate bitcoin_script;

use bitcoin_script::{testing, ErrorSink, Flags, Interpreter, Script};

fuzz_target!(|tup: (u32, bool, &[u8], &[u8], Vec<Vec<u8>>, u32)| {
    // `fuzz_target!` doesn’t support pattern matching in the parameter list.
    let (lock_time, is_final, pub_key, sig, witness, flag_bits) = tup;
    let (Ok(sig), Ok(pub_key)) = (Script::parse_raw(sig), Script::parse_raw(pub_key)) else {
        return;
    };
    let checker = bitcoin_script::signature::TransactionSignatureChecker {
        lock_time: lock_time.into(),
        is_final,
    };
    let mut sink = ErrorSink::new();
    let ok = Interpreter::new(sig.add(&pub_key), testing::sighash(), witness, &mut sink)
        .with_flags(Flags::from_bits_truncate(flag_bits))
        .with_checker(&checker)
        .evaluate_script();
    assert_eq!(ok, sink.is_ok());
    assert!(sink.is_set());
});
