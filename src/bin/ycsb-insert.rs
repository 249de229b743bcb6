use std::env;
use anyhow::{Result, anyhow};
use dexter_tarantool_bench::{init_tracing, load_properties, Db, Fields, TarantoolAdapter};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        eprintln!("Usage: {} <properties_file> <key> <field=value>...", args[0]);
        std::process::exit(1);
    }
    init_tracing();

    let props = load_properties(&args[1])?;
    let key = &args[2];

    let mut values = Fields::new();
    for pair in &args[3..] {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid field `{}`. Expected `<name>=<value>`.", pair))?;
        values.insert(name.to_string(), value.as_bytes().to_vec());
    }

    let mut db = TarantoolAdapter::init(&props)?;
    let status = db.insert("usertable", key, &values);
    db.cleanup()?;

    println!("{}", status);
    if !status.is_ok() {
        std::process::exit(1);
    }
    Ok(())
}
