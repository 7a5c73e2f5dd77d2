#![no_main]

use libfuzzer_sys::fuzz_target;
extern crate bitcoin_script;

use bitcoin_script::{opcode::Opcode, Command, Script};

/// An empty push is written as OP_0, so that's what it reads back as.
fn normalized(script: Script) -> Vec<Command> {
    script
        .into_commands()
        .into_iter()
        .map(|command| match command {
            Command::PushData(data) if data.is_empty() => Opcode::OP_0.into(),
            other => other,
        })
        .collect()
}

fuzz_target!(|data: &[u8]| {
    let mut reader = data;
    if let Ok(script) = Script::parse(&mut reader) {
        let consumed = data.len() - reader.len();
        // Re-encoding may differ from the input (a PUSHDATA1 of 10 bytes comes back as a direct
        // push), but it has to parse back to the same commands.
        // PUSHDATA2 can carry more than a script element may hold, and those can't be written.
        let Ok(bytes) = script.serialize() else {
            return;
        };
        assert!(bytes.len() <= consumed);
        let reparsed = Script::parse(&mut &bytes[..]).expect("serialized script parses");
        assert_eq!(normalized(reparsed), normalized(script));
    }
});
