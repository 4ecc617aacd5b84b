use zeitgraph_core::export::GraphSchema;

pub fn run() {
    print!("{}", GraphSchema::new());
}
