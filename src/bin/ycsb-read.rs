use std::env;
use anyhow::Result;
use dexter_tarantool_bench::{init_tracing, load_properties, Db, FieldSet, Fields, TarantoolAdapter};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <properties_file> <key> [field...]", args[0]);
        std::process::exit(1);
    }
    init_tracing();

    let props = load_properties(&args[1])?;
    let key = &args[2];
    let requested: FieldSet = args[3..].iter().cloned().collect();
    let fields = (!requested.is_empty()).then_some(&requested);

    let mut db = TarantoolAdapter::init(&props)?;
    let mut row = Fields::new();
    let status = db.read("usertable", key, fields, &mut row);
    db.cleanup()?;

    println!("{}", status);
    let mut names: Vec<_> = row.keys().collect();
    names.sort();
    for name in names {
        println!("{} = '{}'", name, String::from_utf8_lossy(&row[name]));
    }
    if !status.is_ok() {
        std::process::exit(1);
    }
    Ok(())
}
