#[cfg(windows)]
use winres::WindowsResource;

fn main() {
    #[cfg(windows)]
    {
        WindowsResource::new()
            .set_icon("img/BiliBili-Manga-Downloader.ico")
            .compile()
            .expect("failed to embed Windows icon");
    }
}
