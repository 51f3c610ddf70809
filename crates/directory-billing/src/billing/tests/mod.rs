mod common;
mod routing;
mod subscription;
