mod archive_tests;
mod codec_tests;
