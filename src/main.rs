use rwkernel::Engine;

fn main() {
    rwkernel::cli(Engine::default())
}
