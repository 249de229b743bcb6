use std::env;
use anyhow::{Result, anyhow};
use dexter_tarantool_bench::{init_tracing, load_properties, Db, FieldSet, TarantoolAdapter};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        eprintln!("Usage: {} <properties_file> <start_key> <count> [field...]", args[0]);
        std::process::exit(1);
    }
    init_tracing();

    let props = load_properties(&args[1])?;
    let start_key = &args[2];
    let count: usize = args[3].parse().map_err(|_| anyhow!("Invalid count"))?;
    let requested: FieldSet = args[4..].iter().cloned().collect();
    let fields = (!requested.is_empty()).then_some(&requested);

    let mut db = TarantoolAdapter::init(&props)?;
    let mut rows = Vec::new();
    let status = db.scan("usertable", start_key, count, fields, &mut rows);
    db.cleanup()?;

    println!("{}", status);
    for (i, row) in rows.iter().enumerate() {
        let mut names: Vec<_> = row.keys().collect();
        names.sort();
        let rendered: Vec<String> = names
            .into_iter()
            .map(|name| format!("{}='{}'", name, String::from_utf8_lossy(&row[name])))
            .collect();
        println!("#{}: {}", i, rendered.join(" "));
    }
    if !status.is_ok() {
        std::process::exit(1);
    }
    Ok(())
}
