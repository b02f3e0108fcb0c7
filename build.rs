fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=native/uci_shim.c");
    println!("cargo:rerun-if-changed=native/ubus_shim.c");

    #[cfg(feature = "native")]
    {
        cc::Build::new()
            .file("native/uci_shim.c")
            .file("native/ubus_shim.c")
            .warnings(true)
            .compile("openwrt_bind_shim");

        for lib in ["uci", "ubus", "ubox", "blobmsg_json"] {
            println!("cargo:rustc-link-lib={}", lib);
        }
    }

    Ok(())
}
