use wasmi::{Caller, Engine, Linker, Module, Store};

/// Values captured from the `print` and `log` host functions.
#[derive(Debug, Default)]
pub struct Host {
    pub printed: Vec<i32>,
    pub logged: Vec<i32>,
}

/// Instantiate wasm bytes with capturing `env.print` / `env.log` host
/// functions and run every entry export (`main`, then the
/// `__top_level_*` slices in element order).
pub fn run_entries(bytes: &[u8]) -> Host {
    let engine = Engine::default();
    let module = Module::new(&engine, bytes).expect("module");
    let mut linker = Linker::new(&engine);
    linker
        .func_wrap(
            "env",
            "print",
            |mut caller: Caller<'_, Host>, value: i32| -> i32 {
                caller.data_mut().printed.push(value);
                value
            },
        )
        .expect("link print");
    linker
        .func_wrap(
            "env",
            "log",
            |mut caller: Caller<'_, Host>, value: i32| -> i32 {
                caller.data_mut().logged.push(value);
                value
            },
        )
        .expect("link log");

    let mut store = Store::new(&engine, Host::default());
    let instance = linker
        .instantiate_and_start(&mut store, &module)
        .expect("instantiate");

    let mut entries: Vec<(usize, String)> = Vec::new();
    for export in module.exports() {
        let name = export.name();
        if name == "main" {
            entries.push((0, name.to_string()));
        } else if let Some(rest) = name.strip_prefix("__top_level_") {
            let elem: usize = rest.parse().expect("slice entry suffix");
            entries.push((elem, name.to_string()));
        }
    }
    entries.sort();

    for (_, name) in &entries {
        let func = instance
            .get_typed_func::<(), i32>(&store, name)
            .expect("entry export");
        func.call(&mut store, ()).expect("execute entry");
    }
    store.into_data()
}
