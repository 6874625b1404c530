fn main() -> anyhow::Result<()> {
    sweepbench_codecs::link();
    sweepbench_cli::run()
}
