use dexter_tarantool_bench::{init_tracing, load_properties, Db, TarantoolAdapter};
use std::env;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        eprintln!("Usage: {} <properties_file> <key>", args[0]);
        std::process::exit(1);
    }
    init_tracing();

    let props = load_properties(&args[1])?;
    let key = &args[2];

    let mut db = TarantoolAdapter::init(&props)?;
    let status = db.delete("usertable", key);
    db.cleanup()?;

    println!("{}", status);
    if !status.is_ok() {
        std::process::exit(1);
    }
    Ok(())
}
