//! Tests for the patch files shipped in `patches/`, run against fixture trees
//! shaped like the upstream sources they target.

mod frida_core;
